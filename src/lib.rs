//! Drive Risk - On-device driving-risk scoring engine
//!
//! Turns live accelerometer/gyroscope readings into a stable 0-100 risk score
//! through a deterministic pipeline: sensor buffering → classifier inference
//! → per-class risk mapping → temporal smoothing.
//!
//! ## Modules
//!
//! - **Sensor buffer**: latest 6-axis reading, written from the sensor thread
//! - **Inference**: classifier runtime seam with output normalization
//! - **Scorer**: class probabilities to raw risk, image-channel blend
//! - **Smoother**: moving average with a rate-of-change clamp
//! - **Pipeline**: the per-session engine tying the stages together
//! - **Events**: recorded sensor streams and interval replay

pub mod config;
pub mod error;
pub mod events;
pub mod inference;
pub mod pipeline;
pub mod scorer;
pub mod sensor;
pub mod sink;
pub mod smoother;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{ScoringConfig, NEUTRAL_RISK};
pub use error::{ScoringError, ScoringResult};
pub use inference::{ClassifierBackend, InferenceAdapter, ModelOutput, OutputValues};
#[cfg(feature = "onnx")]
pub use inference::OnnxClassifier;
pub use pipeline::RiskEngine;
pub use scorer::{ConstantImageRisk, ImageRiskSignal, RiskScorer};
pub use sensor::SensorBuffer;
pub use sink::{MemorySink, NdjsonSink, RiskSink};
pub use smoother::TemporalSmoother;
pub use types::{
    DrivingClass, EngineStatus, FallbackReason, RiskRecord, ScoreUpdate, SensorEvent, SensorKind,
    SensorSample, SkipReason, TickOutcome,
};

/// Library version
pub const DRIVE_RISK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in diagnostics
pub const PRODUCER_NAME: &str = "drive-risk";
