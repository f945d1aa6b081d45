//! Risk scoring
//!
//! Maps classifier probabilities to a raw risk number on a fixed scale:
//!
//! | class          | formula             | range     |
//! |----------------|---------------------|-----------|
//! | 0 aggressive   | `80 + conf * 20`    | [80, 100] |
//! | 1 normal       | `conf * 30`         | [0, 30]   |
//! | 2+ slow/other  | `30 + conf * 40`    | [30, 70]  |
//!
//! Aggressive driving always lands high and normal driving always lands low,
//! whatever the confidence spread.

use crate::config::{ScoringConfig, NEUTRAL_RISK};
use crate::error::{ScoringError, ScoringResult};
use crate::types::DrivingClass;

/// Source of the vision-based risk channel
pub trait ImageRiskSignal: Send {
    /// Current image risk on the 0-100 scale
    fn image_risk(&mut self) -> f32;
}

/// Placeholder image channel returning a constant
#[derive(Debug, Clone, Copy)]
pub struct ConstantImageRisk(pub f32);

impl Default for ConstantImageRisk {
    fn default() -> Self {
        Self(NEUTRAL_RISK)
    }
}

impl ImageRiskSignal for ConstantImageRisk {
    fn image_risk(&mut self) -> f32 {
        self.0
    }
}

/// Pick the most probable class, first index winning ties.
///
/// Returns `None` for an empty vector.
pub fn classify(probabilities: &[f32]) -> Option<(DrivingClass, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &p) in probabilities.iter().enumerate() {
        match best {
            Some((_, max)) if p <= max => {}
            _ => best = Some((index, p)),
        }
    }
    best.map(|(index, confidence)| (DrivingClass::from_index(index), confidence))
}

/// Per-class affine mapping from confidence to raw risk
pub fn class_risk(class: DrivingClass, confidence: f32) -> f32 {
    match class {
        DrivingClass::Aggressive => 80.0 + confidence * 20.0,
        DrivingClass::Normal => confidence * 30.0,
        DrivingClass::Slow => 30.0 + confidence * 40.0,
    }
}

/// Converts probabilities to raw risk and blends the sensor and image channels
#[derive(Debug, Clone, Copy)]
pub struct RiskScorer {
    sensor_weight: f32,
    image_weight: f32,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

impl RiskScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            sensor_weight: config.sensor_weight,
            image_weight: config.image_weight,
        }
    }

    /// Raw sensor risk for a probability vector
    pub fn score(&self, probabilities: &[f32]) -> ScoringResult<f32> {
        self.score_detailed(probabilities).map(|(_, _, risk)| risk)
    }

    /// Predicted class, its confidence, and the raw sensor risk
    pub fn score_detailed(&self, probabilities: &[f32]) -> ScoringResult<(DrivingClass, f32, f32)> {
        let (class, confidence) = classify(probabilities)
            .ok_or_else(|| ScoringError::model_output("empty probability vector"))?;
        Ok((class, confidence, class_risk(class, confidence)))
    }

    /// Weighted combination of sensor and image risk
    pub fn blend(&self, sensor_risk: f32, image_risk: f32) -> f32 {
        sensor_risk * self.sensor_weight + image_risk * self.image_weight
    }
}
