//! Engine orchestration
//!
//! [`RiskEngine`] is the explicitly owned context object tying the stages
//! together. One engine lives for one driving session:
//!
//! 1. SensorBuffer - latest accelerometer/gyroscope reading
//! 2. InferenceAdapter - class probabilities from the 6-feature vector
//! 3. RiskScorer - raw sensor risk, blended with the image channel
//! 4. TemporalSmoother - rate-limited published score
//!
//! Scoring never fails outright. Missing data skips the cycle; an absent or
//! misbehaving model falls back to the neutral score and the engine reports
//! itself as degraded.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ScoringConfig;
use crate::error::{ScoringError, ScoringResult};
use crate::inference::{InferenceAdapter, FEATURE_COUNT};
use crate::scorer::{ConstantImageRisk, ImageRiskSignal, RiskScorer};
use crate::sensor::SensorBuffer;
use crate::sink::RiskSink;
use crate::smoother::TemporalSmoother;
use crate::types::{EngineStatus, FallbackReason, RiskRecord, SkipReason, TickOutcome};

/// Stateful scoring session
pub struct RiskEngine {
    config: ScoringConfig,
    sensors: Arc<SensorBuffer>,
    adapter: Option<InferenceAdapter>,
    status: EngineStatus,
    scorer: RiskScorer,
    smoother: TemporalSmoother,
    image: Box<dyn ImageRiskSignal>,
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("config", &self.config)
            .field("adapter", &self.adapter)
            .field("status", &self.status)
            .field("smoother", &self.smoother)
            .finish()
    }
}

impl RiskEngine {
    /// Create an engine around a loaded classifier
    pub fn new(config: ScoringConfig, adapter: InferenceAdapter) -> ScoringResult<Self> {
        config.validate()?;
        info!(backend = adapter.backend_name(), "Risk engine ready");
        Ok(Self::assemble(config, Some(adapter), EngineStatus::Ready))
    }

    /// Create an engine without a classifier; every tick uses the neutral score
    pub fn degraded(config: ScoringConfig, reason: impl Into<String>) -> ScoringResult<Self> {
        config.validate()?;
        let reason = reason.into();
        warn!(%reason, "Risk engine running in degraded mode");
        Ok(Self::assemble(
            config,
            None,
            EngineStatus::Degraded { reason },
        ))
    }

    /// Create an engine from the outcome of a model load.
    ///
    /// Load failures degrade the engine instead of failing construction; only
    /// an invalid configuration is an error.
    pub fn from_load_result(
        config: ScoringConfig,
        loaded: ScoringResult<InferenceAdapter>,
    ) -> ScoringResult<Self> {
        match loaded {
            Ok(adapter) => Self::new(config, adapter),
            Err(e) => Self::degraded(config, e.to_string()),
        }
    }

    /// Load the classifier from a model file
    pub fn from_model_file<P: AsRef<Path>>(config: ScoringConfig, path: P) -> ScoringResult<Self> {
        Self::from_load_result(config, InferenceAdapter::load_file(path))
    }

    /// Load the classifier from in-memory model bytes
    pub fn from_model_bytes(config: ScoringConfig, bytes: &[u8]) -> ScoringResult<Self> {
        Self::from_load_result(config, InferenceAdapter::load(bytes))
    }

    fn assemble(
        config: ScoringConfig,
        adapter: Option<InferenceAdapter>,
        status: EngineStatus,
    ) -> Self {
        Self {
            scorer: RiskScorer::new(&config),
            smoother: TemporalSmoother::new(&config),
            image: Box::new(ConstantImageRisk(config.neutral_risk)),
            sensors: Arc::new(SensorBuffer::new()),
            adapter,
            status,
            config,
        }
    }

    /// Replace the image-risk channel
    pub fn with_image_signal(mut self, image: Box<dyn ImageRiskSignal>) -> Self {
        self.image = image;
        self
    }

    /// Shared handle for the sensor-event thread
    pub fn sensors(&self) -> Arc<SensorBuffer> {
        Arc::clone(&self.sensors)
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Current published score
    pub fn published(&self) -> f32 {
        self.smoother.published()
    }

    pub fn smoother(&self) -> &TemporalSmoother {
        &self.smoother
    }

    /// Score the current sensor buffer
    pub fn tick(&mut self) -> TickOutcome {
        let features = self.sensors.features();
        self.score_features(&features)
    }

    /// Score an explicit feature vector
    pub fn score_features(&mut self, features: &[f32; FEATURE_COUNT]) -> TickOutcome {
        if features.iter().all(|v| *v == 0.0) {
            return self.skip(SkipReason::NoData);
        }
        if features.iter().any(|v| !v.is_finite()) {
            return self.skip(SkipReason::NonFiniteInput);
        }

        let inferred = self.adapter.as_mut().map(|adapter| adapter.infer(features));

        let probabilities = match inferred {
            None => return self.fallback(FallbackReason::ModelUnavailable),
            Some(Ok(p)) => p,
            Some(Err(ScoringError::InvalidInput(_))) => {
                return self.skip(SkipReason::NonFiniteInput)
            }
            Some(Err(e @ ScoringError::ModelOutput(_))) => {
                warn!(error = %e, "Falling back to neutral risk");
                return self.fallback(FallbackReason::UnrecognizedOutput);
            }
            Some(Err(e)) => {
                warn!(error = %e, "Falling back to neutral risk");
                return self.fallback(FallbackReason::InferenceFailed);
            }
        };

        let (class, confidence, sensor_risk) = match self.scorer.score_detailed(&probabilities) {
            Ok(scored) => scored,
            Err(e) => {
                warn!(error = %e, "Falling back to neutral risk");
                return self.fallback(FallbackReason::UnrecognizedOutput);
            }
        };

        let image_risk = self.image.image_risk();
        let raw = self.scorer.blend(sensor_risk, image_risk);
        match self.smoother.update(raw) {
            Some(update) => {
                debug!(
                    class = class.as_str(),
                    confidence,
                    sensor_risk,
                    raw,
                    published = update.published,
                    "Scored tick"
                );
                TickOutcome::Scored {
                    class,
                    confidence,
                    sensor_risk,
                    image_risk,
                    update,
                }
            }
            None => self.skip(SkipReason::NonFiniteInput),
        }
    }

    fn skip(&self, reason: SkipReason) -> TickOutcome {
        debug!(?reason, "Skipping tick");
        TickOutcome::Skipped {
            reason,
            published: self.smoother.published(),
        }
    }

    fn fallback(&mut self, reason: FallbackReason) -> TickOutcome {
        let image_risk = self.image.image_risk();
        let raw = self.scorer.blend(self.config.neutral_risk, image_risk);
        match self.smoother.update(raw) {
            Some(update) => TickOutcome::Fallback { reason, update },
            None => self.skip(SkipReason::NonFiniteInput),
        }
    }

    /// Tick and hand the published score to `sink`, stamped with the wall clock
    pub fn tick_and_persist(&mut self, user_id: &str, sink: &mut dyn RiskSink) -> TickOutcome {
        self.tick_and_persist_at(user_id, Utc::now().timestamp_millis(), sink)
    }

    /// Tick and hand the published score to `sink` with an explicit timestamp.
    ///
    /// Skipped ticks publish nothing and write nothing. Sink failures are
    /// logged and dropped.
    pub fn tick_and_persist_at(
        &mut self,
        user_id: &str,
        timestamp_ms: i64,
        sink: &mut dyn RiskSink,
    ) -> TickOutcome {
        let outcome = self.tick();
        if outcome.updated() {
            let record = RiskRecord {
                user_id: user_id.to_string(),
                timestamp: timestamp_ms,
                risk: outcome.published(),
            };
            if let Err(e) = sink.persist(&record) {
                warn!(error = %e, user_id, "Failed to persist risk record");
            }
        }
        outcome
    }

    /// Start a new session: neutral smoother state and an empty sensor buffer
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.sensors.clear();
    }

    /// Release the classifier session
    pub fn shutdown(self) {
        info!(published = self.smoother.published(), "Shutting down risk engine");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::FixedBackend;
    use crate::inference::{ModelOutput, OutputValues};
    use crate::sink::MemorySink;
    use crate::types::DrivingClass;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn engine_with(backend: FixedBackend) -> RiskEngine {
        RiskEngine::new(
            ScoringConfig::default(),
            InferenceAdapter::new(Box::new(backend)),
        )
        .unwrap()
    }

    fn feed_motion(engine: &RiskEngine) {
        let sensors = engine.sensors();
        sensors.update_accelerometer_at(0.3, 9.7, 1.2, 1_000);
        sensors.update_gyroscope_at(0.02, -0.01, 0.4, 1_005);
    }

    struct FailingSink;

    impl RiskSink for FailingSink {
        fn persist(&mut self, _record: &RiskRecord) -> ScoringResult<()> {
            Err(ScoringError::persistence("store offline"))
        }
    }

    #[test]
    fn test_all_zero_buffer_skips_inference() {
        let backend = FixedBackend::probabilities(&[0.9, 0.05, 0.05]);
        let calls = backend.call_counter();
        let mut engine = engine_with(backend);

        let outcome = engine.tick();
        assert_eq!(
            outcome,
            TickOutcome::Skipped {
                reason: SkipReason::NoData,
                published: 50.0
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(engine.smoother().is_empty());
    }

    #[test]
    fn test_cleared_buffer_keeps_previous_score() {
        let backend = FixedBackend::probabilities(&[0.9, 0.05, 0.05]);
        let calls = backend.call_counter();
        let mut engine = engine_with(backend);

        feed_motion(&engine);
        assert_eq!(engine.tick().published(), 60.0);
        assert_eq!(engine.smoother().len(), 1);

        engine.sensors().clear();
        let outcome = engine.tick();
        assert_eq!(
            outcome,
            TickOutcome::Skipped {
                reason: SkipReason::NoData,
                published: 60.0
            }
        );
        assert_eq!(engine.published(), 60.0);
        assert_eq!(engine.smoother().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_finite_buffer_is_skipped() {
        let mut engine = engine_with(FixedBackend::probabilities(&[0.9, 0.05, 0.05]));
        engine.sensors().update_accelerometer_at(f32::NAN, 0.0, 0.0, 1);

        let outcome = engine.tick();
        assert!(matches!(
            outcome,
            TickOutcome::Skipped {
                reason: SkipReason::NonFiniteInput,
                ..
            }
        ));
        assert_eq!(engine.published(), 50.0);
    }

    #[test]
    fn test_aggressive_tick_is_blended_and_clamped() {
        let mut engine = engine_with(FixedBackend::probabilities(&[0.9, 0.05, 0.05]));
        feed_motion(&engine);

        match engine.tick() {
            TickOutcome::Scored {
                class,
                sensor_risk,
                image_risk,
                update,
                ..
            } => {
                assert_eq!(class, DrivingClass::Aggressive);
                assert!((sensor_risk - 98.0).abs() < 1e-4);
                assert_eq!(image_risk, 50.0);
                assert!((update.raw - 78.8).abs() < 1e-4);
                assert_eq!(update.published, 60.0);
                assert!(update.clamped);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_nested_i64_output_is_accepted() {
        let output = ModelOutput::Nested(vec![OutputValues::I64(vec![0, 1, 0])]);
        let mut engine = engine_with(FixedBackend::returning(output));
        feed_motion(&engine);

        match engine.tick() {
            TickOutcome::Scored {
                class, sensor_risk, ..
            } => {
                assert_eq!(class, DrivingClass::Normal);
                assert_eq!(sensor_risk, 30.0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_output_falls_back_to_neutral() {
        let mut engine = engine_with(FixedBackend::returning(ModelOutput::Unsupported(
            "sequence<map>".to_string(),
        )));
        feed_motion(&engine);

        match engine.tick() {
            TickOutcome::Fallback { reason, update } => {
                assert_eq!(reason, FallbackReason::UnrecognizedOutput);
                assert_eq!(update.raw, 50.0);
                assert_eq!(update.published, 50.0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(engine.status(), &EngineStatus::Ready);
    }

    #[test]
    fn test_backend_failure_falls_back() {
        let mut engine = engine_with(FixedBackend::failing("runtime error"));
        feed_motion(&engine);
        assert!(matches!(
            engine.tick(),
            TickOutcome::Fallback {
                reason: FallbackReason::InferenceFailed,
                ..
            }
        ));
    }

    #[test]
    fn test_degraded_engine_reports_status() {
        let mut engine =
            RiskEngine::from_model_bytes(ScoringConfig::default(), &[]).unwrap();
        assert!(engine.status().is_degraded());

        feed_motion(&engine);
        assert!(matches!(
            engine.tick(),
            TickOutcome::Fallback {
                reason: FallbackReason::ModelUnavailable,
                ..
            }
        ));
        assert_eq!(engine.published(), 50.0);
    }

    #[test]
    fn test_degraded_engine_holds_neutral() {
        let mut degraded = RiskEngine::degraded(ScoringConfig::default(), "no model").unwrap();
        feed_motion(&degraded);
        for _ in 0..5 {
            let outcome = degraded.tick();
            assert_eq!(outcome.published(), 50.0);
        }
        assert_eq!(degraded.smoother().len(), 5);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ScoringConfig::default().with_history_capacity(0);
        assert!(matches!(
            RiskEngine::degraded(config, "no model"),
            Err(ScoringError::Config(_))
        ));
    }

    #[test]
    fn test_oversized_history_is_rejected() {
        let config = ScoringConfig::default().with_history_capacity(usize::MAX);
        assert!(matches!(
            RiskEngine::degraded(config, "no model"),
            Err(ScoringError::Config(_))
        ));
    }

    #[test]
    fn test_persist_writes_record_for_published_scores() {
        let mut engine = engine_with(FixedBackend::probabilities(&[0.1, 0.8, 0.1]));
        let mut sink = MemorySink::default();

        // Nothing published yet, nothing written.
        engine.tick_and_persist_at("driver-7", 1_000, &mut sink);
        assert!(sink.records.is_empty());

        feed_motion(&engine);
        let outcome = engine.tick_and_persist_at("driver-7", 2_000, &mut sink);
        assert_eq!(
            sink.records,
            vec![RiskRecord {
                user_id: "driver-7".to_string(),
                timestamp: 2_000,
                risk: outcome.published(),
            }]
        );
    }

    #[test]
    fn test_sink_failure_does_not_disturb_state() {
        let mut engine = engine_with(FixedBackend::probabilities(&[0.1, 0.8, 0.1]));
        feed_motion(&engine);

        let outcome = engine.tick_and_persist("driver-7", &mut FailingSink);
        assert!(outcome.updated());
        assert_eq!(engine.published(), outcome.published());
        assert_eq!(engine.smoother().len(), 1);
    }

    #[test]
    fn test_custom_image_signal() {
        struct HighImageRisk;
        impl ImageRiskSignal for HighImageRisk {
            fn image_risk(&mut self) -> f32 {
                100.0
            }
        }

        let mut engine = engine_with(FixedBackend::probabilities(&[0.0, 1.0, 0.0]))
            .with_image_signal(Box::new(HighImageRisk));
        feed_motion(&engine);

        match engine.tick() {
            TickOutcome::Scored { update, .. } => {
                // 0.6 * 30 + 0.4 * 100
                assert!((update.raw - 58.0).abs() < 1e-4);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_reset_starts_new_session() {
        let mut engine = engine_with(FixedBackend::probabilities(&[1.0, 0.0, 0.0]));
        feed_motion(&engine);
        engine.tick();
        assert!(engine.published() > 50.0);

        engine.reset();
        assert_eq!(engine.published(), 50.0);
        assert!(engine.sensors().snapshot().is_all_zero());
        engine.shutdown();
    }

    #[test]
    fn test_sensor_thread_feeds_engine() {
        let mut engine = engine_with(FixedBackend::probabilities(&[0.0, 0.0, 1.0]));
        let sensors = engine.sensors();

        std::thread::spawn(move || {
            sensors.update_accelerometer(0.5, 9.8, 0.1);
            sensors.update_gyroscope(0.0, 0.1, 0.0);
        })
        .join()
        .unwrap();

        match engine.tick() {
            TickOutcome::Scored { class, .. } => assert_eq!(class, DrivingClass::Slow),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
