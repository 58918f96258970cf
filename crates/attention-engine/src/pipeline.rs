//! The per-frame engagement pipeline.
//!
//! ```text
//! admit -> features -> classify -> expression -> smooth -> combine -> deliver
//! ```
//!
//! Processing runs inline on the caller's thread. Threshold snapshots and
//! the status cache can be read from other threads through the handles
//! returned by [`EngagementPipeline::threshold_store`] and
//! [`EngagementPipeline::status_cache`].

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::calibration::AdaptiveThresholdStore;
use crate::classifier::AttentionClassifier;
use crate::config::EngineConfig;
use crate::ear::BlinkAssessment;
use crate::engagement::EngagementCombiner;
use crate::expression::ExpressionScorer;
use crate::features::{FaceObservation, FeatureExtractor};
use crate::governor::{FrameGovernor, PerformanceStats, StatusCache, UiDecision};
use crate::pool::ScratchPool;
use crate::smoother::TemporalSmoother;
use crate::store::{CalibrationStore, MemoryStore};
use crate::thresholds::ThresholdSet;
use crate::types::{AttentionState, EngagementReport, FeatureFrame};

/// Receives results the frame governor lets through.
pub trait PipelineListener: Send {
    fn on_status_update(&mut self, status: &str);
    fn on_comprehensive_results(&mut self, report: &EngagementReport);
}

/// Writes the one-line status, e.g. `Attentive 87% | Smiling | Engagement 72%`.
pub fn write_status(out: &mut String, report: &EngagementReport) {
    // Writing to a String cannot fail.
    let _ = write!(
        out,
        "{} {:.0}% | {} | Engagement {:.0}%",
        report.attention.state.label(),
        report.attention.confidence * 100.0,
        report.expression.primary.label(),
        report.overall_engagement * 100.0
    );
}

struct ProcessingTimer {
    #[cfg(not(target_arch = "wasm32"))]
    start: std::time::Instant,
}

impl ProcessingTimer {
    fn start() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            start: std::time::Instant::now(),
        }
    }

    /// `None` where no monotonic clock is available; the host reports timings itself there.
    fn elapsed_ms(&self) -> Option<f64> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            Some(self.start.elapsed().as_secs_f64() * 1000.0)
        }
        #[cfg(target_arch = "wasm32")]
        {
            None
        }
    }
}

pub struct EngagementPipeline {
    extractor: FeatureExtractor,
    classifier: AttentionClassifier,
    smoother: TemporalSmoother,
    expression: ExpressionScorer,
    combiner: EngagementCombiner,
    governor: FrameGovernor,
    thresholds: Arc<AdaptiveThresholdStore>,
    status_pool: ScratchPool<String>,
    listener: Option<Box<dyn PipelineListener>>,
    last_report: Option<EngagementReport>,
}

impl EngagementPipeline {
    pub fn new(config: EngineConfig, store: Arc<dyn CalibrationStore>) -> Self {
        let EngineConfig {
            ear,
            smoothing,
            thresholds,
            calibration,
            classifier,
            expression,
            engagement,
            governor,
        } = config;

        Self {
            extractor: FeatureExtractor::new(ear),
            classifier: AttentionClassifier::new(classifier),
            smoother: TemporalSmoother::new(smoothing),
            expression: ExpressionScorer::new(expression),
            combiner: EngagementCombiner::new(engagement),
            governor: FrameGovernor::new(governor),
            thresholds: Arc::new(AdaptiveThresholdStore::new(calibration, thresholds, store)),
            status_pool: ScratchPool::new(2),
            listener: None,
            last_report: None,
        }
    }

    /// Default configuration with an in-memory calibration store.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default(), Arc::new(MemoryStore::new()))
    }

    pub fn set_listener(&mut self, listener: Box<dyn PipelineListener>) {
        self.listener = Some(listener);
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    /// Classifies an already extracted frame. Bypasses the governor and listener.
    pub fn process_frame(&mut self, frame: &FeatureFrame) -> EngagementReport {
        let thresholds = self.thresholds.current();

        let raw = self.classifier.classify(frame, &thresholds);
        let expression = self
            .expression
            .score(frame.has_blendshapes.then_some(&frame.blendshapes));
        let attention = self.smoother.add_and_smooth(raw);
        if attention.state != raw.state {
            trace!(raw = ?raw.state, smoothed = ?attention.state, "Raw verdict smoothed over");
        }

        let report = self.combiner.combine(attention, expression);
        self.last_report = Some(report);
        report
    }

    /// Runs one detector result through the full pipeline.
    ///
    /// Returns `None` when the governor drops the frame. While calibrating,
    /// qualifying frames are also recorded as calibration samples.
    pub fn on_observation(&mut self, observation: &FaceObservation, now_ms: u64) -> Option<EngagementReport> {
        if !self.governor.admit(now_ms) {
            trace!(now_ms, "Frame dropped by governor");
            return None;
        }
        let timer = ProcessingTimer::start();

        let thresholds = self.thresholds.current();
        let frame = self.extractor.extract(observation, &thresholds);
        self.add_calibration_sample(&frame);

        let report = self.process_frame(&frame);
        if let Some(elapsed) = timer.elapsed_ms() {
            self.governor.record_processing_time(elapsed);
        }
        self.deliver(&report, now_ms);
        Some(report)
    }

    fn deliver(&mut self, report: &EngagementReport, now_ms: u64) {
        match self.governor.ui_decision(report, now_ms) {
            UiDecision::Emit => {
                let mut text = self.status_pool.acquire();
                write_status(&mut text, report);
                self.governor.status_cache().store(&text, now_ms);
                debug!(status = %text.as_str(), "Status updated");
                if let Some(listener) = self.listener.as_mut() {
                    listener.on_status_update(&text);
                    listener.on_comprehensive_results(report);
                }
            }
            UiDecision::ServeCached => {
                let cached = self.governor.status_cache().get(now_ms);
                if let (Some(listener), Some(text)) = (self.listener.as_mut(), cached) {
                    listener.on_status_update(&text);
                }
            }
            UiDecision::Suppress => {}
        }
    }

    /// Feeds a host-measured processing duration to the governor.
    pub fn record_processing_time(&mut self, elapsed_ms: f64) {
        self.governor.record_processing_time(elapsed_ms);
    }

    pub fn update_environment(&self, brightness: f64, face_size: f64) {
        self.thresholds.update_environment(brightness, face_size);
    }

    pub fn start_calibration(&self) {
        self.thresholds.start_calibration();
    }

    /// Adds `frame` as a calibration sample if calibration is running and the frame qualifies.
    pub fn add_calibration_sample(&self, frame: &FeatureFrame) -> bool {
        self.thresholds.qualifies(frame) && self.thresholds.add_sample(frame)
    }

    pub fn finish_calibration(&self) -> bool {
        self.thresholds.finish_calibration()
    }

    pub fn calibration_progress(&self) -> f64 {
        self.thresholds.progress()
    }

    pub fn is_calibrated(&self) -> bool {
        self.thresholds.is_calibrated()
    }

    pub fn reset_thresholds(&self) {
        self.thresholds.reset_to_defaults();
    }

    pub fn reinforce(&self, predicted: AttentionState, actual: AttentionState) -> bool {
        self.thresholds.reinforce(predicted, actual)
    }

    pub fn thresholds(&self) -> Arc<ThresholdSet> {
        self.thresholds.current()
    }

    /// Shared handle for reading thresholds or driving calibration from another thread.
    pub fn threshold_store(&self) -> Arc<AdaptiveThresholdStore> {
        Arc::clone(&self.thresholds)
    }

    pub fn status_cache(&self) -> StatusCache {
        self.governor.status_cache().clone()
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        self.governor.stats()
    }

    pub fn last_report(&self) -> Option<&EngagementReport> {
        self.last_report.as_ref()
    }

    /// Blink check on the most recent observation.
    pub fn last_blink(&self) -> BlinkAssessment {
        self.extractor.blink(&self.thresholds.current())
    }

    /// Clears per-session state. Calibration and persisted thresholds are kept.
    pub fn reset(&mut self) {
        self.extractor.reset();
        self.smoother.reset();
        self.expression.reset();
        self.governor.reset();
        self.last_report = None;
    }
}
