//! Engine configuration
//!
//! Every field has a serde default so partial JSON files are accepted; the
//! defaults reproduce the dashcam app's tuning.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ScoringError, ScoringResult};

/// Default number of raw scores kept for the moving average
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Largest accepted history length
pub const MAX_HISTORY_CAPACITY: usize = 1024;

/// Default exponential smoothing factor
pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.2;

/// Default maximum change of the published score per update
pub const DEFAULT_MAX_CHANGE: f32 = 10.0;

/// Neutral score used at session start and whenever the model cannot answer
pub const NEUTRAL_RISK: f32 = 50.0;

/// Configuration for scoring and smoothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Raw scores retained for the moving average
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Exponential smoothing factor (alpha)
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: f32,
    /// Largest allowed change of the published score per update
    #[serde(default = "default_max_change")]
    pub max_change: f32,
    /// Neutral default score
    #[serde(default = "default_neutral_risk")]
    pub neutral_risk: f32,
    /// Weight of the sensor-model risk in the blended raw score
    #[serde(default = "default_sensor_weight")]
    pub sensor_weight: f32,
    /// Weight of the image risk in the blended raw score
    #[serde(default = "default_image_weight")]
    pub image_weight: f32,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_smoothing_factor() -> f32 {
    DEFAULT_SMOOTHING_FACTOR
}

fn default_max_change() -> f32 {
    DEFAULT_MAX_CHANGE
}

fn default_neutral_risk() -> f32 {
    NEUTRAL_RISK
}

fn default_sensor_weight() -> f32 {
    0.6
}

fn default_image_weight() -> f32 {
    0.4
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            smoothing_factor: default_smoothing_factor(),
            max_change: default_max_change(),
            neutral_risk: default_neutral_risk(),
            sensor_weight: default_sensor_weight(),
            image_weight: default_image_weight(),
        }
    }
}

impl ScoringConfig {
    /// Parse and validate configuration from JSON
    pub fn from_json(json: &str) -> ScoringResult<Self> {
        let config: ScoringConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ScoringResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> ScoringResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the history capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the maximum change per update
    pub fn with_max_change(mut self, max_change: f32) -> Self {
        self.max_change = max_change;
        self
    }

    pub fn validate(&self) -> ScoringResult<()> {
        if self.history_capacity == 0 {
            return Err(ScoringError::config("history_capacity must be at least 1"));
        }
        if self.history_capacity > MAX_HISTORY_CAPACITY {
            return Err(ScoringError::config(format!(
                "history_capacity must be at most {}, got {}",
                MAX_HISTORY_CAPACITY, self.history_capacity
            )));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(ScoringError::config(format!(
                "smoothing_factor must be in (0, 1], got {}",
                self.smoothing_factor
            )));
        }
        if !(self.max_change.is_finite() && self.max_change > 0.0) {
            return Err(ScoringError::config(format!(
                "max_change must be positive, got {}",
                self.max_change
            )));
        }
        if !(0.0..=100.0).contains(&self.neutral_risk) {
            return Err(ScoringError::config(format!(
                "neutral_risk must be within 0-100, got {}",
                self.neutral_risk
            )));
        }
        if self.sensor_weight < 0.0 || self.image_weight < 0.0 {
            return Err(ScoringError::config("blend weights must be non-negative"));
        }
        let total = self.sensor_weight + self.image_weight;
        if (total - 1.0).abs() > 1e-4 {
            return Err(ScoringError::config(format!(
                "blend weights must sum to 1, got {}",
                total
            )));
        }
        Ok(())
    }
}
