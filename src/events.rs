//! Sensor event streams
//!
//! Parsing and validation of recorded sensor events, and a replay driver that
//! fires scoring ticks on a fixed interval of event time.

use tracing::{debug, warn};

use crate::error::{ScoringError, ScoringResult};
use crate::pipeline::RiskEngine;
use crate::sink::RiskSink;
use crate::types::SensorEvent;

/// Parse a JSON array of sensor events
pub fn parse_array(json: &str) -> ScoringResult<Vec<SensorEvent>> {
    let events: Vec<SensorEvent> = serde_json::from_str(json)?;
    Ok(events)
}

/// Parse NDJSON (one sensor event per line)
pub fn parse_ndjson(ndjson: &str) -> ScoringResult<Vec<SensorEvent>> {
    let mut events = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<SensorEvent>(trimmed) {
            Ok(event) => events.push(event),
            Err(e) => {
                return Err(ScoringError::invalid_input(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(events)
}

/// A rejected event and why
#[derive(Debug)]
pub struct EventValidation {
    pub index: usize,
    pub error: ScoringError,
}

/// Validate a batch of events, returning only the failures
pub fn validate_events(events: &[SensorEvent]) -> Vec<EventValidation> {
    events
        .iter()
        .enumerate()
        .filter_map(|(index, event)| {
            event
                .validate()
                .err()
                .map(|error| EventValidation { index, error })
        })
        .collect()
}

/// Most ticks fired for a single gap between two events
pub const MAX_CATCH_UP_TICKS: i64 = 60;

/// Replays timestamped events into an engine, ticking every `interval_ms`.
///
/// A tick at time `t` sees every event stamped before `t`. The first tick
/// fires one interval after the first event. A gap spanning more than
/// [`MAX_CATCH_UP_TICKS`] intervals fires only that many ticks; the schedule
/// then resumes on the first interval after the event.
#[derive(Debug)]
pub struct IntervalReplay {
    interval_ms: i64,
    next_tick: Option<i64>,
}

impl IntervalReplay {
    pub fn new(interval_ms: i64) -> ScoringResult<Self> {
        if interval_ms <= 0 {
            return Err(ScoringError::config(format!(
                "tick interval must be positive, got {}",
                interval_ms
            )));
        }
        Ok(Self {
            interval_ms,
            next_tick: None,
        })
    }

    /// Apply one event, firing any ticks due before it. Returns the number of
    /// ticks fired.
    pub fn feed(
        &mut self,
        engine: &mut RiskEngine,
        event: &SensorEvent,
        user_id: &str,
        sink: &mut dyn RiskSink,
    ) -> ScoringResult<usize> {
        event.validate()?;
        let ts = event
            .timestamp_ms
            .ok_or_else(|| ScoringError::invalid_input("replayed events need timestamp_ms"))?;

        let mut fired = 0;
        match self.next_tick {
            None => self.next_tick = Some(self.advance(ts, 1, ts)?),
            Some(due) if ts >= due => {
                // Both are non-negative, so the difference cannot overflow.
                let missed = (ts - due) / self.interval_ms + 1;
                let next = self.advance(due, missed, ts)?;

                let due_now = missed.min(MAX_CATCH_UP_TICKS);
                if missed > due_now {
                    warn!(
                        gap_ms = ts - due,
                        skipped = missed - due_now,
                        "Event gap too long, skipping ticks"
                    );
                }
                for k in 0..due_now {
                    engine.tick_and_persist_at(user_id, due + k * self.interval_ms, sink);
                }
                fired = due_now as usize;
                self.next_tick = Some(next);
            }
            Some(_) => {}
        }

        engine.sensors().apply(event);
        Ok(fired)
    }

    /// `from + intervals * interval_ms`, rejecting schedules past the i64 range
    fn advance(&self, from: i64, intervals: i64, ts: i64) -> ScoringResult<i64> {
        intervals
            .checked_mul(self.interval_ms)
            .and_then(|span| from.checked_add(span))
            .ok_or_else(|| {
                ScoringError::invalid_input(format!("timestamp {} is out of range", ts))
            })
    }

    /// Fire the pending tick after the last event
    pub fn finish(
        &mut self,
        engine: &mut RiskEngine,
        user_id: &str,
        sink: &mut dyn RiskSink,
    ) -> usize {
        match self.next_tick.take() {
            Some(due) => {
                engine.tick_and_persist_at(user_id, due, sink);
                debug!(at = due, "Replay finished");
                1
            }
            None => 0,
        }
    }
}
