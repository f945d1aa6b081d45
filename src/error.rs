//! Error types for the risk engine

use thiserror::Error;

/// Result type alias for scoring operations
pub type ScoringResult<T> = Result<T, ScoringError>;

/// Errors that can occur while loading models, scoring, or persisting results
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Unrecognized model output: {0}")]
    ModelOutput(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoringError {
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        ScoringError::ModelLoad(msg.into())
    }

    pub fn model_output<S: Into<String>>(msg: S) -> Self {
        ScoringError::ModelOutput(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        ScoringError::Inference(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        ScoringError::InvalidInput(msg.into())
    }

    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        ScoringError::Persistence(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        ScoringError::Config(msg.into())
    }

    /// Whether this error should put the engine into the neutral-score fallback
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            ScoringError::ModelLoad(_) | ScoringError::ModelOutput(_) | ScoringError::Inference(_)
        )
    }
}
