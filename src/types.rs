//! Core types for the risk engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: sensor events and samples, driving classes, smoothing updates, tick
//! outcomes, and the persisted risk record.

use serde::{Deserialize, Serialize};

use crate::error::{ScoringError, ScoringResult};

/// Physical sensor that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
        }
    }
}

/// A single platform sensor event: type tag plus three axis values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    /// Which sensor fired
    pub sensor: SensorKind,
    /// Axis values (x, y, z)
    pub values: [f32; 3],
    /// Event time in milliseconds since epoch (wall clock is used when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
}

impl SensorEvent {
    pub fn accelerometer(x: f32, y: f32, z: f32) -> Self {
        Self {
            sensor: SensorKind::Accelerometer,
            values: [x, y, z],
            timestamp_ms: None,
        }
    }

    pub fn gyroscope(x: f32, y: f32, z: f32) -> Self {
        Self {
            sensor: SensorKind::Gyroscope,
            values: [x, y, z],
            timestamp_ms: None,
        }
    }

    pub fn at(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Reject events carrying NaN/Inf axis values or negative timestamps
    pub fn validate(&self) -> ScoringResult<()> {
        if let Some(axis) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(ScoringError::invalid_input(format!(
                "{} axis {} is not finite",
                self.sensor.as_str(),
                axis
            )));
        }
        if let Some(ts) = self.timestamp_ms {
            if ts < 0 {
                return Err(ScoringError::invalid_input(format!(
                    "negative timestamp {}",
                    ts
                )));
            }
        }
        Ok(())
    }
}

/// Latest 6-axis reading with its last-update stamp
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSample {
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
    /// Milliseconds since epoch of the most recent write to either axis group
    pub last_update_timestamp: i64,
}

impl SensorSample {
    /// Feature vector in classifier order
    pub fn features(&self) -> [f32; 6] {
        [
            self.accel_x,
            self.accel_y,
            self.accel_z,
            self.gyro_x,
            self.gyro_y,
            self.gyro_z,
        ]
    }

    /// True when no axis has been populated yet
    pub fn is_all_zero(&self) -> bool {
        self.features().iter().all(|v| *v == 0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.features().iter().all(|v| v.is_finite())
    }
}

/// Driving-style class, indexed by training convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrivingClass {
    Aggressive,
    Normal,
    Slow,
}

impl DrivingClass {
    /// Map a classifier output index to a class; indices past 1 are all `Slow`
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => DrivingClass::Aggressive,
            1 => DrivingClass::Normal,
            _ => DrivingClass::Slow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DrivingClass::Aggressive => "aggressive",
            DrivingClass::Normal => "normal",
            DrivingClass::Slow => "slow",
        }
    }
}

/// Result of one smoothing step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    /// Score that entered the smoother
    pub raw: f32,
    /// Mean of the history after the push (smoothed candidate)
    pub moving_average: f32,
    /// First-order exponential estimate carried as state
    pub exponential: f32,
    /// Rate-limited value exposed to UI and persistence
    pub published: f32,
    /// Whether the max-change clamp was applied
    pub clamped: bool,
}

/// Why a tick did not reach the smoother
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Buffer still holds the all-zero initial sample
    NoData,
    /// Buffer holds NaN/Inf
    NonFiniteInput,
}

/// Why a tick used the neutral default instead of a classifier score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    ModelUnavailable,
    InferenceFailed,
    UnrecognizedOutput,
}

/// Outcome of a single scoring trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    Scored {
        class: DrivingClass,
        confidence: f32,
        sensor_risk: f32,
        image_risk: f32,
        update: ScoreUpdate,
    },
    Skipped {
        reason: SkipReason,
        published: f32,
    },
    Fallback {
        reason: FallbackReason,
        update: ScoreUpdate,
    },
}

impl TickOutcome {
    /// Published score after this tick
    pub fn published(&self) -> f32 {
        match self {
            TickOutcome::Scored { update, .. } | TickOutcome::Fallback { update, .. } => {
                update.published
            }
            TickOutcome::Skipped { published, .. } => *published,
        }
    }

    /// Whether the smoother state advanced on this tick
    pub fn updated(&self) -> bool {
        !matches!(self, TickOutcome::Skipped { .. })
    }
}

/// Degraded-mode indicator surfaced to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EngineStatus {
    Ready,
    Degraded { reason: String },
}

impl EngineStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, EngineStatus::Degraded { .. })
    }
}

/// Persisted score record written to the external document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRecord {
    pub user_id: String,
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub risk: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_driving_class_from_index() {
        assert_eq!(DrivingClass::from_index(0), DrivingClass::Aggressive);
        assert_eq!(DrivingClass::from_index(1), DrivingClass::Normal);
        assert_eq!(DrivingClass::from_index(2), DrivingClass::Slow);
        assert_eq!(DrivingClass::from_index(7), DrivingClass::Slow);
    }

    #[test]
    fn test_sensor_event_json_shape() {
        let event: SensorEvent = serde_json::from_str(
            r#"{"sensor": "gyroscope", "values": [0.1, -0.2, 0.3], "timestamp_ms": 1700000000000}"#,
        )
        .unwrap();
        assert_eq!(event.sensor, SensorKind::Gyroscope);
        assert_eq!(event.values, [0.1, -0.2, 0.3]);
        assert_eq!(event.timestamp_ms, Some(1_700_000_000_000));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_sensor_event_rejects_non_finite() {
        let event = SensorEvent::accelerometer(f32::NAN, 0.0, 9.8);
        assert!(matches!(
            event.validate(),
            Err(ScoringError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_sample_all_zero() {
        let mut sample = SensorSample::default();
        assert!(sample.is_all_zero());
        sample.gyro_z = 0.01;
        assert!(!sample.is_all_zero());
        assert_eq!(sample.features(), [0.0, 0.0, 0.0, 0.0, 0.0, 0.01]);
    }

    #[test]
    fn test_risk_record_field_names() {
        let record = RiskRecord {
            user_id: "user-1".to_string(),
            timestamp: 1_700_000_000_000,
            risk: 42.5,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"userId": "user-1", "timestamp": 1700000000000i64, "risk": 42.5})
        );
    }

    #[test]
    fn test_tick_outcome_published() {
        let skipped = TickOutcome::Skipped {
            reason: SkipReason::NoData,
            published: 50.0,
        };
        assert_eq!(skipped.published(), 50.0);
        assert!(!skipped.updated());

        let value = serde_json::to_value(&skipped).unwrap();
        assert_eq!(value["outcome"], "skipped");
        assert_eq!(value["reason"], "no_data");
    }
}
