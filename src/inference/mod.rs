//! Classifier inference
//!
//! The adapter hides the inference runtime behind [`ClassifierBackend`] and
//! converges whatever the model emits onto a flat `Vec<f32>` of class
//! probabilities.
//!
//! Backends report their raw result as a [`ModelOutput`]: a tagged variant
//! with one case per accepted shape (flat or nested) and element width
//! (`f32`, `f64`, `i64`). Anything else is reported as
//! [`ModelOutput::Unsupported`] and surfaces as
//! [`ScoringError::ModelOutput`].

#[cfg(feature = "onnx")]
mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

use std::path::Path;
use tracing::debug;

use crate::error::{ScoringError, ScoringResult};

/// Number of features fed to the classifier
pub const FEATURE_COUNT: usize = 6;

/// Element data of one output array
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValues {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I64(Vec<i64>),
}

impl OutputValues {
    fn into_f32(self) -> Vec<f32> {
        match self {
            OutputValues::F32(v) => v,
            OutputValues::F64(v) => v.into_iter().map(|x| x as f32).collect(),
            OutputValues::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OutputValues::F32(v) => v.len(),
            OutputValues::F64(v) => v.len(),
            OutputValues::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw classifier result as produced by a backend
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// A single array of class values
    Flat(OutputValues),
    /// Array of arrays, one row per batch entry
    Nested(Vec<OutputValues>),
    /// Output the adapter cannot interpret
    Unsupported(String),
}

impl ModelOutput {
    /// Flatten into class probabilities.
    ///
    /// Nested rows are concatenated in order. Empty results and non-finite
    /// values are rejected.
    pub fn decode(self) -> ScoringResult<Vec<f32>> {
        let values = match self {
            ModelOutput::Flat(values) => values.into_f32(),
            ModelOutput::Nested(rows) => rows.into_iter().flat_map(OutputValues::into_f32).collect(),
            ModelOutput::Unsupported(description) => {
                return Err(ScoringError::model_output(description))
            }
        };

        if values.is_empty() {
            return Err(ScoringError::model_output("model returned no values"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::model_output("model returned non-finite values"));
        }
        Ok(values)
    }
}

/// Inference runtime seam
pub trait ClassifierBackend: Send {
    /// Backend name for logs and diagnostics
    fn name(&self) -> &str;

    /// Run one forward pass over the feature vector
    fn run(&mut self, features: &[f32; FEATURE_COUNT]) -> ScoringResult<ModelOutput>;
}

/// Owns a classifier backend and normalizes its output
pub struct InferenceAdapter {
    backend: Box<dyn ClassifierBackend>,
}

impl std::fmt::Debug for InferenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceAdapter")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl InferenceAdapter {
    /// Wrap an already constructed backend
    pub fn new(backend: Box<dyn ClassifierBackend>) -> Self {
        Self { backend }
    }

    /// Load a serialized model into the default runtime
    #[cfg(feature = "onnx")]
    pub fn load(model_bytes: &[u8]) -> ScoringResult<Self> {
        let backend = OnnxClassifier::from_bytes(model_bytes)?;
        Ok(Self::new(Box::new(backend)))
    }

    /// Load a serialized model into the default runtime
    #[cfg(not(feature = "onnx"))]
    pub fn load(model_bytes: &[u8]) -> ScoringResult<Self> {
        if model_bytes.is_empty() {
            return Err(ScoringError::model_load("model byte stream is empty"));
        }
        Err(ScoringError::model_load(
            "no inference runtime compiled in (enable the `onnx` feature)",
        ))
    }

    /// Load a model file into the default runtime
    pub fn load_file<P: AsRef<Path>>(path: P) -> ScoringResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            ScoringError::model_load(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::load(&bytes)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run the classifier and return flat class probabilities
    pub fn infer(&mut self, features: &[f32; FEATURE_COUNT]) -> ScoringResult<Vec<f32>> {
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::invalid_input("feature vector contains NaN/Inf"));
        }
        let output = self.backend.run(features)?;
        let probabilities = output.decode()?;
        debug!(backend = self.backend.name(), ?probabilities, "Inference complete");
        Ok(probabilities)
    }
}
