//! Per-user adaptive thresholds.
//!
//! Calibration collects features from frames that already look attentive by
//! default thresholds, derives personal thresholds from their averages and
//! persists them. Environment signals and feedback adjust the published set
//! afterwards. All updates are stage-and-swap: a new [`ThresholdSet`] is built
//! and then published as a fresh `Arc`, so readers on another thread always
//! see a complete set.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CalibrationConfig;
use crate::store::CalibrationStore;
use crate::thresholds::{distance_factor, lighting_factor, ThresholdSet};
use crate::types::{AttentionState, FeatureFrame};

const KEY_CALIBRATED: &str = "calibration.calibrated";
const KEY_AVG_EAR: &str = "calibration.avg_ear";
const KEY_AVG_YAW: &str = "calibration.avg_yaw";
const KEY_AVG_PITCH: &str = "calibration.avg_pitch";
const KEY_SAMPLE_COUNT: &str = "calibration.sample_count";
const KEY_EAR: &str = "threshold.ear";
const KEY_YAW: &str = "threshold.yaw";
const KEY_PITCH: &str = "threshold.pitch";
const KEY_BLINK: &str = "threshold.blink";

/// Averages collected while the user was judged attentive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBaseline {
    pub avg_ear: f64,
    /// Mean |yaw| in degrees
    pub avg_yaw_range: f64,
    /// Mean |pitch| in degrees
    pub avg_pitch_range: f64,
    pub sample_count: usize,
    pub calibrated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationPhase {
    Uncalibrated,
    Calibrating,
    Calibrated,
}

#[derive(Debug, Clone, Copy)]
struct CalibrationSample {
    ear: f64,
    yaw_range: f64,
    pitch_range: f64,
}

#[derive(Debug, Clone, Copy)]
enum Nudge {
    Ear(f64),
    RelaxPose,
}

struct CalibrationState {
    phase: CalibrationPhase,
    baseline: CalibrationBaseline,
    samples: Vec<CalibrationSample>,
}

/// Derives personal thresholds from a baseline; non-baseline values come from `defaults`.
pub fn derive_thresholds(
    baseline: &CalibrationBaseline,
    defaults: &ThresholdSet,
    config: &CalibrationConfig,
) -> ThresholdSet {
    let ear = (baseline.avg_ear * config.ear_ratio).clamp(config.ear_min, config.ear_max);
    let yaw = (baseline.avg_yaw_range * config.range_multiplier).clamp(config.yaw_min, config.yaw_max);
    let pitch =
        (baseline.avg_pitch_range * config.range_multiplier).clamp(config.pitch_min, config.pitch_max);
    let ear_ratio = if config.reference_ear > 0.0 {
        baseline.avg_ear / config.reference_ear
    } else {
        1.0
    };
    let blink = (defaults.blink * ear_ratio).clamp(config.blink_min, config.blink_max);

    ThresholdSet {
        ear,
        yaw,
        pitch,
        blink,
        ..*defaults
    }
}

pub struct AdaptiveThresholdStore {
    config: CalibrationConfig,
    defaults: ThresholdSet,
    store: Arc<dyn CalibrationStore>,
    state: Mutex<CalibrationState>,
    published: RwLock<Arc<ThresholdSet>>,
}

impl AdaptiveThresholdStore {
    /// Creates the store and loads any previously persisted calibration.
    pub fn new(
        config: CalibrationConfig,
        defaults: ThresholdSet,
        store: Arc<dyn CalibrationStore>,
    ) -> Self {
        let (phase, baseline, thresholds) = Self::load(&config, &defaults, store.as_ref());
        if baseline.calibrated {
            info!(
                samples = baseline.sample_count,
                ear = thresholds.ear,
                "Loaded persisted calibration"
            );
        }

        Self {
            state: Mutex::new(CalibrationState {
                phase,
                baseline,
                samples: Vec::with_capacity(config.min_samples),
            }),
            published: RwLock::new(Arc::new(thresholds)),
            config,
            defaults,
            store,
        }
    }

    fn load(
        config: &CalibrationConfig,
        defaults: &ThresholdSet,
        store: &dyn CalibrationStore,
    ) -> (CalibrationPhase, CalibrationBaseline, ThresholdSet) {
        if store.get(KEY_CALIBRATED, 0.0) < 0.5 {
            // Feedback is persisted whether or not a calibration exists.
            let thresholds = ThresholdSet {
                ear: store.get(KEY_EAR, defaults.ear),
                yaw: store.get(KEY_YAW, defaults.yaw),
                pitch: store.get(KEY_PITCH, defaults.pitch),
                ..*defaults
            };
            return (CalibrationPhase::Uncalibrated, CalibrationBaseline::default(), thresholds);
        }

        let baseline = CalibrationBaseline {
            avg_ear: store.get(KEY_AVG_EAR, 0.0),
            avg_yaw_range: store.get(KEY_AVG_YAW, 0.0),
            avg_pitch_range: store.get(KEY_AVG_PITCH, 0.0),
            sample_count: store.get(KEY_SAMPLE_COUNT, 0.0).max(0.0) as usize,
            calibrated: true,
        };
        let derived = derive_thresholds(&baseline, defaults, config);
        // Reinforcement may have moved these after calibration.
        let thresholds = ThresholdSet {
            ear: store.get(KEY_EAR, derived.ear),
            yaw: store.get(KEY_YAW, derived.yaw),
            pitch: store.get(KEY_PITCH, derived.pitch),
            blink: store.get(KEY_BLINK, derived.blink),
            ..derived
        };
        (CalibrationPhase::Calibrated, baseline, thresholds)
    }

    /// Snapshot of the thresholds currently in force, environment multipliers included.
    pub fn current(&self) -> Arc<ThresholdSet> {
        Arc::clone(&self.published.read())
    }

    pub fn baseline(&self) -> CalibrationBaseline {
        self.state.lock().baseline
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.state.lock().phase
    }

    pub fn is_calibrated(&self) -> bool {
        self.state.lock().baseline.calibrated
    }

    /// Whether a frame is trustworthy enough to become a calibration sample.
    pub fn qualifies(&self, frame: &FeatureFrame) -> bool {
        frame.is_eyes_open
            && frame.is_pose_attentive
            && frame.confidence > self.config.sample_min_confidence
    }

    pub fn start_calibration(&self) {
        let mut state = self.state.lock();
        state.phase = CalibrationPhase::Calibrating;
        state.samples.clear();
        info!(required = self.config.min_samples, "Calibration started");
    }

    /// Records a sample. Returns false when no calibration is running.
    pub fn add_sample(&self, frame: &FeatureFrame) -> bool {
        let mut state = self.state.lock();
        if state.phase != CalibrationPhase::Calibrating {
            return false;
        }
        state.samples.push(CalibrationSample {
            ear: frame.average_ear,
            yaw_range: frame.yaw.abs(),
            pitch_range: frame.pitch.abs(),
        });
        true
    }

    /// Fraction of the required samples collected so far, in [0, 1].
    pub fn progress(&self) -> f64 {
        let state = self.state.lock();
        match state.phase {
            CalibrationPhase::Calibrating => {
                (state.samples.len() as f64 / self.config.min_samples as f64).min(1.0)
            }
            CalibrationPhase::Calibrated => 1.0,
            CalibrationPhase::Uncalibrated => 0.0,
        }
    }

    /// Completes a running calibration.
    ///
    /// Returns false, leaving the calibration open, when fewer than the
    /// required number of samples were collected.
    pub fn finish_calibration(&self) -> bool {
        let mut state = self.state.lock();
        if state.phase != CalibrationPhase::Calibrating {
            debug!("finish_calibration called without a running calibration");
            return false;
        }

        let count = state.samples.len();
        if count < self.config.min_samples {
            info!(
                collected = count,
                required = self.config.min_samples,
                "Calibration needs more samples"
            );
            return false;
        }

        let n = count as f64;
        let baseline = CalibrationBaseline {
            avg_ear: state.samples.iter().map(|s| s.ear).sum::<f64>() / n,
            avg_yaw_range: state.samples.iter().map(|s| s.yaw_range).sum::<f64>() / n,
            avg_pitch_range: state.samples.iter().map(|s| s.pitch_range).sum::<f64>() / n,
            sample_count: count,
            calibrated: true,
        };
        let derived = derive_thresholds(&baseline, &self.defaults, &self.config);
        self.publish(|current| derived.with_environment(current.lighting_factor, current.distance_factor));

        state.baseline = baseline;
        state.phase = CalibrationPhase::Calibrated;
        state.samples.clear();
        drop(state);

        self.persist(&[
            (KEY_AVG_EAR, baseline.avg_ear),
            (KEY_AVG_YAW, baseline.avg_yaw_range),
            (KEY_AVG_PITCH, baseline.avg_pitch_range),
            (KEY_SAMPLE_COUNT, count as f64),
            (KEY_EAR, derived.ear),
            (KEY_YAW, derived.yaw),
            (KEY_PITCH, derived.pitch),
            (KEY_BLINK, derived.blink),
            (KEY_CALIBRATED, 1.0),
        ]);

        info!(
            samples = count,
            ear = derived.ear,
            yaw = derived.yaw,
            pitch = derived.pitch,
            blink = derived.blink,
            "Calibration completed"
        );
        true
    }

    /// Drops calibration, restores default thresholds and clears the store.
    pub fn reset_to_defaults(&self) {
        let mut state = self.state.lock();
        state.phase = CalibrationPhase::Uncalibrated;
        state.baseline = CalibrationBaseline::default();
        state.samples.clear();
        drop(state);

        let defaults = self.defaults;
        self.publish(|current| defaults.with_environment(current.lighting_factor, current.distance_factor));

        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted calibration");
        }
        info!("Thresholds reset to defaults");
    }

    /// Applies ambient brightness and normalized face size, both in [0, 1].
    pub fn update_environment(&self, brightness: f64, face_size: f64) {
        let lighting = lighting_factor(brightness);
        let distance = distance_factor(face_size);
        let current = self.current();
        if current.lighting_factor == lighting && current.distance_factor == distance {
            return;
        }
        self.publish(|current| current.with_environment(lighting, distance));
    }

    /// Nudges thresholds after feedback that `predicted` was really `actual`.
    ///
    /// Returns true when a threshold moved; the new values are persisted
    /// immediately.
    pub fn reinforce(&self, predicted: AttentionState, actual: AttentionState) -> bool {
        let cfg = &self.config;
        let step = cfg.reinforcement_step;

        let nudge = match (predicted, actual) {
            // Eyes flagged closed too eagerly
            (AttentionState::DrowsyFatigued, AttentionState::Attentive) => Nudge::Ear(1.0 - step),
            // Missed closed eyes
            (AttentionState::Attentive, AttentionState::DrowsyFatigued) => Nudge::Ear(1.0 + step),
            // Pose limits too tight
            (AttentionState::DistractedLookingAway, AttentionState::Attentive) => Nudge::RelaxPose,
            _ => return false,
        };

        let next = self.publish(|t| match nudge {
            Nudge::Ear(scale) => ThresholdSet {
                ear: (t.ear * scale).clamp(cfg.ear_min, cfg.ear_max),
                ..*t
            },
            Nudge::RelaxPose => ThresholdSet {
                yaw: (t.yaw * (1.0 + step)).min(cfg.yaw_max),
                pitch: (t.pitch * (1.0 + step)).min(cfg.pitch_max),
                ..*t
            },
        });
        debug!(?predicted, ?actual, ear = next.ear, yaw = next.yaw, pitch = next.pitch, "Thresholds reinforced");

        self.persist(&[
            (KEY_EAR, next.ear),
            (KEY_YAW, next.yaw),
            (KEY_PITCH, next.pitch),
        ]);
        true
    }

    /// Builds the next set from the current one and swaps it in atomically.
    fn publish(&self, build: impl FnOnce(&ThresholdSet) -> ThresholdSet) -> ThresholdSet {
        let mut published = self.published.write();
        let next = build(&**published);
        *published = Arc::new(next);
        next
    }

    fn persist(&self, values: &[(&str, f64)]) {
        for (key, value) in values {
            if let Err(e) = self.store.set(key, *value) {
                warn!(error = %e, key = %key, "Failed to persist calibration value");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn attentive_frame(ear: f64, yaw: f64, pitch: f64) -> FeatureFrame {
        FeatureFrame {
            yaw,
            pitch,
            average_ear: ear,
            left_ear: ear,
            right_ear: ear,
            is_eyes_open: true,
            is_pose_attentive: true,
            confidence: 0.9,
            has_head_pose: true,
            ..Default::default()
        }
    }

    fn new_store() -> (Arc<MemoryStore>, AdaptiveThresholdStore) {
        let backing = Arc::new(MemoryStore::new());
        let store = AdaptiveThresholdStore::new(
            CalibrationConfig::default(),
            ThresholdSet::default(),
            backing.clone(),
        );
        (backing, store)
    }

    #[test]
    fn test_finish_without_start_fails() {
        let (_, store) = new_store();
        assert!(!store.finish_calibration());
        assert_eq!(store.phase(), CalibrationPhase::Uncalibrated);
    }

    #[test]
    fn test_finish_with_too_few_samples_stays_calibrating() {
        let (_, store) = new_store();
        store.start_calibration();
        for _ in 0..29 {
            assert!(store.add_sample(&attentive_frame(0.28, 3.0, 2.0)));
        }
        assert!(!store.finish_calibration());
        assert_eq!(store.phase(), CalibrationPhase::Calibrating);
        assert!(!store.is_calibrated());

        // Retry after one more sample
        store.add_sample(&attentive_frame(0.28, 3.0, 2.0));
        assert!(store.finish_calibration());
        assert!(store.is_calibrated());
    }

    #[test]
    fn test_derived_thresholds_respect_clamps() {
        let (backing, store) = new_store();
        store.start_calibration();
        for _ in 0..30 {
            store.add_sample(&attentive_frame(0.28, 5.0, 4.0));
        }
        assert!(store.finish_calibration());

        let t = store.current();
        assert!((t.ear - 0.196).abs() < 1e-9);
        assert_eq!(t.yaw, 15.0);
        assert_eq!(t.pitch, 10.0);
        assert!(t.blink >= 0.3 && t.blink <= 0.8);
        assert_eq!(backing.get(KEY_CALIBRATED, 0.0), 1.0);
        assert_eq!(store.progress(), 1.0);
    }

    #[test]
    fn test_extreme_baseline_is_clamped() {
        let baseline = CalibrationBaseline {
            avg_ear: 0.9,
            avg_yaw_range: 80.0,
            avg_pitch_range: 60.0,
            sample_count: 30,
            calibrated: true,
        };
        let t = derive_thresholds(&baseline, &ThresholdSet::default(), &CalibrationConfig::default());
        assert_eq!(t.ear, 0.20);
        assert_eq!(t.yaw, 40.0);
        assert_eq!(t.pitch, 30.0);
        assert_eq!(t.blink, 0.8);
    }

    #[test]
    fn test_persisted_calibration_is_reloaded() {
        let (backing, store) = new_store();
        store.start_calibration();
        for _ in 0..30 {
            store.add_sample(&attentive_frame(0.2, 20.0, 12.0));
        }
        assert!(store.finish_calibration());
        let expected = *store.current();

        let reloaded = AdaptiveThresholdStore::new(
            CalibrationConfig::default(),
            ThresholdSet::default(),
            backing,
        );
        assert!(reloaded.is_calibrated());
        assert_eq!(reloaded.phase(), CalibrationPhase::Calibrated);
        assert_eq!(*reloaded.current(), expected);
        assert_eq!(reloaded.baseline().sample_count, 30);
    }

    #[test]
    fn test_feedback_without_calibration_survives_restart() {
        let (backing, store) = new_store();
        assert!(store.reinforce(AttentionState::DrowsyFatigued, AttentionState::Attentive));
        assert!(store.reinforce(AttentionState::DistractedLookingAway, AttentionState::Attentive));
        let before = *store.current();
        assert!((before.ear - 0.135).abs() < 1e-9);
        drop(store);

        let restored = AdaptiveThresholdStore::new(
            CalibrationConfig::default(),
            ThresholdSet::default(),
            backing,
        );
        assert!(!restored.is_calibrated());
        assert_eq!(restored.phase(), CalibrationPhase::Uncalibrated);
        let after = restored.current();
        assert!((after.ear - before.ear).abs() < 1e-9);
        assert!((after.yaw - before.yaw).abs() < 1e-9);
        assert!((after.pitch - before.pitch).abs() < 1e-9);
        assert_eq!(after.blink, ThresholdSet::default().blink);
    }

    #[test]
    fn test_reset_clears_store_and_thresholds() {
        let (backing, store) = new_store();
        store.start_calibration();
        for _ in 0..30 {
            store.add_sample(&attentive_frame(0.2, 20.0, 12.0));
        }
        store.finish_calibration();
        store.reset_to_defaults();

        assert!(!store.is_calibrated());
        assert_eq!(*store.current(), ThresholdSet::default());
        assert!(backing.is_empty());
    }

    #[test]
    fn test_environment_is_not_baked_into_calibration() {
        let (_, store) = new_store();
        store.update_environment(0.2, 0.5);
        assert!((store.current().adjusted_ear() - 0.15 * 1.2).abs() < 1e-12);

        store.start_calibration();
        for _ in 0..30 {
            store.add_sample(&attentive_frame(0.2, 20.0, 12.0));
        }
        store.finish_calibration();
        let t = store.current();
        assert!((t.ear - 0.14).abs() < 1e-9);
        assert_eq!(t.lighting_factor, 1.2);

        store.update_environment(0.5, 0.5);
        assert!((store.current().adjusted_ear() - 0.14).abs() < 1e-9);
    }

    #[test]
    fn test_reinforcement_directions() {
        let (backing, store) = new_store();

        assert!(store.reinforce(AttentionState::DrowsyFatigued, AttentionState::Attentive));
        assert!((store.current().ear - 0.135).abs() < 1e-9);
        assert!((backing.get(KEY_EAR, 0.0) - 0.135).abs() < 1e-9);

        assert!(store.reinforce(AttentionState::Attentive, AttentionState::DrowsyFatigued));
        assert!((store.current().ear - 0.1485).abs() < 1e-9);

        assert!(store.reinforce(AttentionState::DistractedLookingAway, AttentionState::Attentive));
        assert!((store.current().yaw - 27.5).abs() < 1e-9);
        assert!((store.current().pitch - 22.0).abs() < 1e-9);

        assert!(!store.reinforce(AttentionState::Yawning, AttentionState::Attentive));
        assert!(!store.reinforce(AttentionState::Attentive, AttentionState::Attentive));
    }

    #[test]
    fn test_reinforcement_respects_bounds() {
        let (_, store) = new_store();
        for _ in 0..50 {
            store.reinforce(AttentionState::DrowsyFatigued, AttentionState::Attentive);
            store.reinforce(AttentionState::DistractedLookingAway, AttentionState::Attentive);
        }
        let t = store.current();
        assert_eq!(t.ear, 0.08);
        assert_eq!(t.yaw, 40.0);
        assert_eq!(t.pitch, 30.0);
    }

    #[test]
    fn test_samples_ignored_when_not_calibrating() {
        let (_, store) = new_store();
        assert!(!store.add_sample(&attentive_frame(0.3, 0.0, 0.0)));
        assert_eq!(store.progress(), 0.0);
        store.start_calibration();
        for _ in 0..15 {
            store.add_sample(&attentive_frame(0.3, 0.0, 0.0));
        }
        assert!((store.progress() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_qualifying_frames() {
        let (_, store) = new_store();
        let good = attentive_frame(0.3, 0.0, 0.0);
        assert!(store.qualifies(&good));
        assert!(!store.qualifies(&FeatureFrame { confidence: 0.7, ..good }));
        assert!(!store.qualifies(&FeatureFrame { is_eyes_open: false, ..good }));
        assert!(!store.qualifies(&FeatureFrame { is_pose_attentive: false, ..good }));
    }

    #[test]
    fn test_concurrent_readers_see_complete_sets() {
        let (_, store) = new_store();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    let t = store.current();
                    assert!(t.lighting_factor == 1.0 || t.lighting_factor == 1.2);
                    assert!(t.ear >= 0.08 && t.ear <= 0.20);
                }
            });
            for i in 0..200 {
                store.update_environment(if i % 2 == 0 { 0.2 } else { 0.5 }, 0.5);
                store.reinforce(AttentionState::DrowsyFatigued, AttentionState::Attentive);
            }
        });
    }
}
