//! Sensor state buffer
//!
//! Holds the most recent accelerometer and gyroscope readings. The two axis
//! groups are written independently from the platform's sensor callbacks and
//! read by the scoring trigger on another thread.
//!
//! Each group sits behind its own lock, so a writer for one sensor never waits
//! on the other. A full read takes the groups one after the other: the
//! resulting sample may pair an older accelerometer reading with a newer
//! gyroscope reading (or the reverse). Readers get the latest value per group,
//! not a cross-sensor snapshot.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::{SensorEvent, SensorKind, SensorSample};

/// Latest-value cell for both motion sensors
#[derive(Debug, Default)]
pub struct SensorBuffer {
    accel: Mutex<[f32; 3]>,
    gyro: Mutex<[f32; 3]>,
    last_update_ms: AtomicI64,
}

impl SensorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the accelerometer axes, stamped with the current wall clock
    pub fn update_accelerometer(&self, x: f32, y: f32, z: f32) {
        self.update_accelerometer_at(x, y, z, Utc::now().timestamp_millis());
    }

    /// Overwrite the gyroscope axes, stamped with the current wall clock
    pub fn update_gyroscope(&self, x: f32, y: f32, z: f32) {
        self.update_gyroscope_at(x, y, z, Utc::now().timestamp_millis());
    }

    pub fn update_accelerometer_at(&self, x: f32, y: f32, z: f32, timestamp_ms: i64) {
        *self.accel.lock() = [x, y, z];
        self.last_update_ms.store(timestamp_ms, Ordering::Release);
    }

    pub fn update_gyroscope_at(&self, x: f32, y: f32, z: f32, timestamp_ms: i64) {
        *self.gyro.lock() = [x, y, z];
        self.last_update_ms.store(timestamp_ms, Ordering::Release);
    }

    /// Route a tagged sensor event to its axis group
    pub fn apply(&self, event: &SensorEvent) {
        let [x, y, z] = event.values;
        let ts = event
            .timestamp_ms
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        match event.sensor {
            SensorKind::Accelerometer => self.update_accelerometer_at(x, y, z, ts),
            SensorKind::Gyroscope => self.update_gyroscope_at(x, y, z, ts),
        }
    }

    /// Read the latest value of each axis group
    pub fn snapshot(&self) -> SensorSample {
        let [accel_x, accel_y, accel_z] = *self.accel.lock();
        let [gyro_x, gyro_y, gyro_z] = *self.gyro.lock();
        SensorSample {
            accel_x,
            accel_y,
            accel_z,
            gyro_x,
            gyro_y,
            gyro_z,
            last_update_timestamp: self.last_update_ms.load(Ordering::Acquire),
        }
    }

    /// Feature vector `[ax, ay, az, gx, gy, gz]`
    pub fn features(&self) -> [f32; 6] {
        self.snapshot().features()
    }

    /// Milliseconds since epoch of the most recent write (0 before any write)
    pub fn last_update_timestamp(&self) -> i64 {
        self.last_update_ms.load(Ordering::Acquire)
    }

    /// Return to the unpopulated all-zero state
    pub fn clear(&self) {
        *self.accel.lock() = [0.0; 3];
        *self.gyro.lock() = [0.0; 3];
        self.last_update_ms.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_groups_overwrite_independently() {
        let buffer = SensorBuffer::new();
        buffer.update_accelerometer_at(1.0, 2.0, 3.0, 100);
        buffer.update_gyroscope_at(0.1, 0.2, 0.3, 200);
        buffer.update_accelerometer_at(4.0, 5.0, 6.0, 300);

        let sample = buffer.snapshot();
        assert_eq!(sample.features(), [4.0, 5.0, 6.0, 0.1, 0.2, 0.3]);
        assert_eq!(sample.last_update_timestamp, 300);
    }

    #[test]
    fn test_fresh_buffer_is_all_zero() {
        let buffer = SensorBuffer::new();
        let sample = buffer.snapshot();
        assert!(sample.is_all_zero());
        assert_eq!(sample.last_update_timestamp, 0);
    }

    #[test]
    fn test_apply_routes_by_sensor_kind() {
        let buffer = SensorBuffer::new();
        buffer.apply(&SensorEvent::gyroscope(0.5, 0.0, -0.5).at(42));
        assert_eq!(buffer.features(), [0.0, 0.0, 0.0, 0.5, 0.0, -0.5]);
        assert_eq!(buffer.last_update_timestamp(), 42);
    }

    #[test]
    fn test_wall_clock_stamp() {
        let buffer = SensorBuffer::new();
        let before = Utc::now().timestamp_millis();
        buffer.update_accelerometer(0.0, 0.0, 9.81);
        assert!(buffer.last_update_timestamp() >= before);
    }

    #[test]
    fn test_clear() {
        let buffer = SensorBuffer::new();
        buffer.update_gyroscope_at(1.0, 1.0, 1.0, 10);
        buffer.clear();
        assert!(buffer.snapshot().is_all_zero());
    }

    #[test]
    fn test_concurrent_writers_keep_axis_groups_whole() {
        let buffer = Arc::new(SensorBuffer::new());

        let accel_writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 1..=1000 {
                    let v = i as f32;
                    buffer.update_accelerometer_at(v, v, v, i);
                }
            })
        };
        let gyro_writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 1..=1000 {
                    let v = -(i as f32);
                    buffer.update_gyroscope_at(v, v, v, i);
                }
            })
        };

        for _ in 0..1000 {
            let f = buffer.features();
            // Each group is written as a unit, so its three axes always agree.
            assert!(f[0] == f[1] && f[1] == f[2]);
            assert!(f[3] == f[4] && f[4] == f[5]);
        }

        accel_writer.join().unwrap();
        gyro_writer.join().unwrap();

        assert_eq!(buffer.features(), [1000.0, 1000.0, 1000.0, -1000.0, -1000.0, -1000.0]);
    }
}
