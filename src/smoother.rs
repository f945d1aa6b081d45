//! Temporal smoothing of raw risk scores
//!
//! Keeps a bounded rolling history of raw scores and publishes the moving
//! average, limited to a maximum change per update against the previously
//! published value. An exponential estimate is tracked alongside and carried
//! as state, but the publish decision uses the moving average only.

use std::collections::VecDeque;

use crate::config::{ScoringConfig, DEFAULT_HISTORY_CAPACITY};
use crate::types::ScoreUpdate;

/// Rolling-window smoother with a rate-of-change clamp
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    /// Most recent raw scores, oldest first
    history: VecDeque<f32>,
    /// Maximum history length
    capacity: usize,
    /// Exponential smoothing factor
    alpha: f32,
    /// Largest allowed step of the published score
    max_change: f32,
    /// Session starting point for both estimates
    neutral: f32,
    last_exponential: f32,
    last_published: f32,
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

impl TemporalSmoother {
    pub fn new(config: &ScoringConfig) -> Self {
        let capacity = config.history_capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
            alpha: config.smoothing_factor,
            max_change: config.max_change,
            neutral: config.neutral_risk,
            last_exponential: config.neutral_risk,
            last_published: config.neutral_risk,
        }
    }

    /// Feed one raw score and return the resulting update.
    ///
    /// Non-finite scores leave the state untouched and return `None`.
    pub fn update(&mut self, raw: f32) -> Option<ScoreUpdate> {
        if !raw.is_finite() {
            return None;
        }

        self.history.push_back(raw);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        let moving_average = self.moving_average();

        let exponential = self.last_exponential + self.alpha * (raw - self.last_exponential);
        self.last_exponential = exponential;

        let delta = moving_average - self.last_published;
        let clamped = delta.abs() > self.max_change;
        let published = if clamped {
            self.last_published + self.max_change.copysign(delta)
        } else {
            moving_average
        };
        self.last_published = published;

        Some(ScoreUpdate {
            raw,
            moving_average,
            exponential,
            published,
            clamped,
        })
    }

    /// Mean of the current history (the neutral score while empty)
    pub fn moving_average(&self) -> f32 {
        if self.history.is_empty() {
            return self.neutral;
        }
        let sum: f32 = self.history.iter().sum();
        sum / self.history.len() as f32
    }

    pub fn published(&self) -> f32 {
        self.last_published
    }

    pub fn exponential(&self) -> f32 {
        self.last_exponential
    }

    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Back to a fresh-session state
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_exponential = self.neutral;
        self.last_published = self.neutral;
    }
}
