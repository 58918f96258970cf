//! Engine configuration.
//!
//! Every constant table the pipeline relies on (weight schedules, per-emotion
//! thresholds, score lookups) lives here and is injected into the component
//! that uses it, so tests can substitute their own values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::thresholds::ThresholdSet;
use crate::types::{AttentionState, BlendshapeFeatures, ExpressionState};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EarConfig {
    pub basic_weight: f64,
    pub extended_weight: f64,
    /// Scale applied to the depth axis in landmark distances
    pub depth_weight: f64,
    pub yaw_correction: f64,
    pub pitch_correction: f64,
    pub roll_correction: f64,
    pub min_correction: f64,
    pub max_correction: f64,
    pub min_ear: f64,
    pub max_ear: f64,
    pub history_size: usize,
    pub smoothing_alpha: f64,
    /// Minimum frame-to-frame drop in average EAR for a blink
    pub blink_change_rate: f64,
}

impl Default for EarConfig {
    fn default() -> Self {
        Self {
            basic_weight: 0.7,
            extended_weight: 0.3,
            depth_weight: 0.1,
            yaw_correction: 0.3,
            pitch_correction: 0.2,
            roll_correction: 0.1,
            min_correction: 0.5,
            max_correction: 2.0,
            min_ear: 0.05,
            max_ear: 0.5,
            history_size: 5,
            smoothing_alpha: 0.3,
            blink_change_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub history_size: usize,
    /// Vote weights by history position, oldest first
    pub decay_weights: Vec<f64>,
    pub min_history: usize,
    pub hysteresis_share: f64,
    pub stable_frames: u32,
    /// Fixed EAR cutoff for the smoothed eyes-open flag
    pub eyes_open_cutoff: f64,
    pub state_match_weight: f64,
    pub raw_confidence_weight: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            history_size: 7,
            decay_weights: vec![0.05, 0.10, 0.15, 0.20, 0.25, 0.25],
            min_history: 3,
            hysteresis_share: 0.7,
            stable_frames: 3,
            eyes_open_cutoff: 0.15,
            state_match_weight: 0.7,
            raw_confidence_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub min_samples: usize,
    /// Frames need more than this confidence to be used as samples
    pub sample_min_confidence: f64,
    /// Population open-eye EAR the blink threshold is scaled against
    pub reference_ear: f64,
    pub ear_ratio: f64,
    pub ear_min: f64,
    pub ear_max: f64,
    pub range_multiplier: f64,
    pub yaw_min: f64,
    pub yaw_max: f64,
    pub pitch_min: f64,
    pub pitch_max: f64,
    pub blink_min: f64,
    pub blink_max: f64,
    pub reinforcement_step: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples: 30,
            sample_min_confidence: 0.7,
            reference_ear: 0.25,
            ear_ratio: 0.7,
            ear_min: 0.08,
            ear_max: 0.20,
            range_multiplier: 1.2,
            yaw_min: 15.0,
            yaw_max: 40.0,
            pitch_min: 10.0,
            pitch_max: 30.0,
            blink_min: 0.3,
            blink_max: 0.8,
            reinforcement_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Pitch (degrees) below which a downward gaze counts as looking away
    pub look_down_pitch: f64,
    pub confused_brow_inner_up: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            look_down_pitch: -15.0,
            confused_brow_inner_up: 0.3,
        }
    }
}

/// Blendshape-derived signal an expression scorer can weigh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionCue {
    MouthSmile,
    CheekSquint,
    JawOpen,
    EyeSquint,
    EyeWide,
    EyeBlink,
    EyeLookDown,
    BrowDown,
    BrowInnerUp,
    BrowOuterUp,
    MouthPress,
    MouthFrown,
    MouthStretch,
    MouthPucker,
    NoseSneer,
}

impl ExpressionCue {
    pub fn value(self, features: &BlendshapeFeatures) -> f64 {
        match self {
            ExpressionCue::MouthSmile => features.mouth_smile(),
            ExpressionCue::CheekSquint => features.cheek_squint(),
            ExpressionCue::JawOpen => features.jaw_open,
            ExpressionCue::EyeSquint => features.eye_squint(),
            ExpressionCue::EyeWide => features.eye_wide(),
            ExpressionCue::EyeBlink => features.eye_blink(),
            ExpressionCue::EyeLookDown => features.eye_look_down(),
            ExpressionCue::BrowDown => features.brow_down(),
            ExpressionCue::BrowInnerUp => features.brow_inner_up,
            ExpressionCue::BrowOuterUp => features.brow_outer_up(),
            ExpressionCue::MouthPress => features.mouth_press(),
            ExpressionCue::MouthFrown => features.mouth_frown(),
            ExpressionCue::MouthStretch => features.mouth_stretch(),
            ExpressionCue::MouthPucker => features.mouth_pucker,
            ExpressionCue::NoseSneer => features.nose_sneer(),
        }
    }
}

/// Linear combination of cues plus the score a candidate must exceed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    pub weights: Vec<(ExpressionCue, f64)>,
    pub threshold: f64,
}

impl ScorerConfig {
    fn new(weights: &[(ExpressionCue, f64)], threshold: f64) -> Self {
        Self {
            weights: weights.to_vec(),
            threshold,
        }
    }

    pub fn score(&self, features: &BlendshapeFeatures) -> f64 {
        self.weights
            .iter()
            .map(|(cue, weight)| cue.value(features) * weight)
            .sum()
    }

    fn weight_sum(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    pub smile: ScorerConfig,
    pub surprise: ScorerConfig,
    pub confusion: ScorerConfig,
    pub concentration: ScorerConfig,
    pub boredom: ScorerConfig,
    pub frustration: ScorerConfig,
    pub excitement: ScorerConfig,
    /// Smile score above which the expression is reported as laughing
    pub laugh_threshold: f64,
    pub secondary_threshold: f64,
    pub neutral_confidence: f64,
    pub neutral_intensity: f64,
    pub intensity_persistence: f64,
    pub switch_damping: f64,
    pub history_size: usize,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        use ExpressionCue::*;
        Self {
            smile: ScorerConfig::new(
                &[(MouthSmile, 0.5), (CheekSquint, 0.25), (JawOpen, 0.15), (EyeSquint, 0.10)],
                0.4,
            ),
            surprise: ScorerConfig::new(
                &[(EyeWide, 0.35), (BrowInnerUp, 0.25), (BrowOuterUp, 0.20), (JawOpen, 0.20)],
                0.45,
            ),
            confusion: ScorerConfig::new(
                &[(BrowDown, 0.40), (BrowInnerUp, 0.30), (EyeSquint, 0.15), (MouthPucker, 0.15)],
                0.35,
            ),
            concentration: ScorerConfig::new(
                &[(BrowDown, 0.35), (EyeSquint, 0.35), (MouthPress, 0.30)],
                0.4,
            ),
            boredom: ScorerConfig::new(
                &[(EyeBlink, 0.35), (EyeLookDown, 0.30), (MouthFrown, 0.20), (MouthStretch, 0.15)],
                0.4,
            ),
            frustration: ScorerConfig::new(
                &[(BrowDown, 0.30), (NoseSneer, 0.25), (MouthFrown, 0.25), (MouthPress, 0.20)],
                0.4,
            ),
            excitement: ScorerConfig::new(
                &[(EyeWide, 0.30), (MouthSmile, 0.30), (BrowOuterUp, 0.20), (JawOpen, 0.20)],
                0.5,
            ),
            laugh_threshold: 0.7,
            secondary_threshold: 0.4,
            neutral_confidence: 0.8,
            neutral_intensity: 0.1,
            intensity_persistence: 0.7,
            switch_damping: 0.7,
            history_size: 5,
        }
    }
}

impl ExpressionConfig {
    /// Scorers paired with the state each one votes for.
    pub fn scorers(&self) -> [(ExpressionState, &ScorerConfig); 7] {
        [
            (ExpressionState::Smiling, &self.smile),
            (ExpressionState::Surprised, &self.surprise),
            (ExpressionState::Confused, &self.confusion),
            (ExpressionState::Concentrating, &self.concentration),
            (ExpressionState::Bored, &self.boredom),
            (ExpressionState::Frustrated, &self.frustration),
            (ExpressionState::Excited, &self.excitement),
        ]
    }
}

/// Engagement contribution of each attention state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionScores {
    pub attentive: f64,
    pub distracted_looking_away: f64,
    pub drowsy_fatigued: f64,
    pub yawning: f64,
    pub thinking_concentrating: f64,
    pub confused: f64,
    pub unknown: f64,
}

impl Default for AttentionScores {
    fn default() -> Self {
        Self {
            attentive: 1.0,
            distracted_looking_away: 0.3,
            drowsy_fatigued: 0.2,
            yawning: 0.3,
            thinking_concentrating: 0.9,
            confused: 0.6,
            unknown: 0.5,
        }
    }
}

impl AttentionScores {
    pub fn score(&self, state: AttentionState) -> f64 {
        match state {
            AttentionState::Attentive => self.attentive,
            AttentionState::DistractedLookingAway => self.distracted_looking_away,
            AttentionState::DrowsyFatigued => self.drowsy_fatigued,
            AttentionState::Yawning => self.yawning,
            AttentionState::ThinkingConcentrating => self.thinking_concentrating,
            AttentionState::Confused => self.confused,
            AttentionState::Unknown => self.unknown,
        }
    }
}

/// Engagement contribution of each expression state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionScores {
    pub neutral: f64,
    pub smiling: f64,
    pub laughing: f64,
    pub surprised: f64,
    pub confused: f64,
    pub concentrating: f64,
    pub bored: f64,
    pub frustrated: f64,
    pub excited: f64,
    pub unknown: f64,
}

impl Default for ExpressionScores {
    fn default() -> Self {
        Self {
            neutral: 0.6,
            smiling: 0.8,
            // Laughing often means attention has drifted to something else.
            laughing: 0.4,
            surprised: 0.7,
            confused: 0.5,
            concentrating: 0.9,
            bored: 0.2,
            frustrated: 0.3,
            excited: 1.0,
            unknown: 0.5,
        }
    }
}

impl ExpressionScores {
    pub fn score(&self, state: ExpressionState) -> f64 {
        match state {
            ExpressionState::Neutral => self.neutral,
            ExpressionState::Smiling => self.smiling,
            ExpressionState::Laughing => self.laughing,
            ExpressionState::Surprised => self.surprised,
            ExpressionState::Confused => self.confused,
            ExpressionState::Concentrating => self.concentrating,
            ExpressionState::Bored => self.bored,
            ExpressionState::Frustrated => self.frustrated,
            ExpressionState::Excited => self.excited,
            ExpressionState::Unknown => self.unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    pub attention_weight: f64,
    pub expression_weight: f64,
    pub attention_scores: AttentionScores,
    pub expression_scores: ExpressionScores,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            attention_weight: 0.6,
            expression_weight: 0.4,
            attention_scores: AttentionScores::default(),
            expression_scores: ExpressionScores::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub target_fps: f64,
    pub window_size: usize,
    /// One frame in this many gets through while shedding load
    pub skip_frame_threshold: u32,
    /// Fraction of the frame budget that counts as overload
    pub overload_ratio: f64,
    pub ui_update_interval_ms: u64,
    pub engagement_delta: f64,
    pub cache_validity_ms: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            target_fps: 15.0,
            window_size: 10,
            skip_frame_threshold: 3,
            overload_ratio: 0.8,
            ui_update_interval_ms: 200,
            engagement_delta: 0.05,
            cache_validity_ms: 1000,
        }
    }
}

impl GovernorConfig {
    pub fn min_interval_ms(&self) -> f64 {
        1000.0 / self.target_fps
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ear: EarConfig,
    pub smoothing: SmoothingConfig,
    /// Thresholds used until a calibration succeeds
    pub thresholds: ThresholdSet,
    pub calibration: CalibrationConfig,
    pub classifier: ClassifierConfig,
    pub expression: ExpressionConfig,
    pub engagement: EngagementConfig,
    pub governor: GovernorConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Defaults with the common knobs overridable from the environment.
    ///
    /// The result is validated, so a value such as `ATTENTION_TARGET_FPS=0`
    /// is rejected instead of stalling the governor.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(val) = lookup("ATTENTION_TARGET_FPS") {
            config.governor.target_fps = parse_var("ATTENTION_TARGET_FPS", &val)?;
        }
        if let Some(val) = lookup("ATTENTION_UI_INTERVAL_MS") {
            config.governor.ui_update_interval_ms = parse_var("ATTENTION_UI_INTERVAL_MS", &val)?;
        }
        if let Some(val) = lookup("ATTENTION_MIN_CALIBRATION_SAMPLES") {
            config.calibration.min_samples = parse_var("ATTENTION_MIN_CALIBRATION_SAMPLES", &val)?;
        }
        if let Some(val) = lookup("ATTENTION_HYSTERESIS_SHARE") {
            config.smoothing.hysteresis_share = parse_var("ATTENTION_HYSTERESIS_SHARE", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.governor.target_fps > 0.0 && self.governor.target_fps.is_finite()) {
            return Err(Error::Config("governor.target_fps must be positive and finite".into()));
        }
        if self.governor.window_size == 0 || self.governor.skip_frame_threshold == 0 {
            return Err(Error::Config(
                "governor window and skip threshold must be at least 1".into(),
            ));
        }
        if self.ear.history_size == 0 || self.smoothing.history_size == 0 {
            return Err(Error::Config("history sizes must be at least 1".into()));
        }
        if self.ear.min_ear > self.ear.max_ear || self.ear.min_correction > self.ear.max_correction {
            return Err(Error::Config("ear bounds are inverted".into()));
        }
        if self.smoothing.decay_weights.is_empty()
            || self.smoothing.decay_weights.iter().any(|w| *w < 0.0)
        {
            return Err(Error::Config(
                "smoothing.decay_weights must be non-empty and non-negative".into(),
            ));
        }
        if !(self.smoothing.hysteresis_share > 0.0 && self.smoothing.hysteresis_share <= 1.0) {
            return Err(Error::Config("smoothing.hysteresis_share must be in (0, 1]".into()));
        }
        if self.calibration.min_samples == 0 {
            return Err(Error::Config("calibration.min_samples must be at least 1".into()));
        }
        for (state, scorer) in self.expression.scorers() {
            if (scorer.weight_sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(Error::Config(format!(
                    "{} scorer weights sum to {:.3}, expected 1.0",
                    state.label(),
                    scorer.weight_sum()
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name}={raw:?} is not a valid value")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_scorer_weights_sum_to_one() {
        let config = ExpressionConfig::default();
        for (_, scorer) in config.scorers() {
            assert!((scorer.weight_sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"governor": {"target_fps": 30.0}}"#).unwrap();
        assert_eq!(config.governor.target_fps, 30.0);
        assert_eq!(config.governor.ui_update_interval_ms, 200);
        assert_eq!(config.smoothing.history_size, 7);
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn test_env_overrides_apply() {
        let config = EngineConfig::from_lookup(env(&[
            ("ATTENTION_TARGET_FPS", "30"),
            ("ATTENTION_UI_INTERVAL_MS", "150"),
        ]))
        .unwrap();
        assert_eq!(config.governor.target_fps, 30.0);
        assert_eq!(config.governor.ui_update_interval_ms, 150);
        assert_eq!(config.calibration.min_samples, 30);
    }

    #[test]
    fn test_env_rejects_unusable_fps() {
        for bad in ["0", "NaN", "inf", "-5", "fast"] {
            let err = EngineConfig::from_lookup(env(&[("ATTENTION_TARGET_FPS", bad)])).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{bad}");
        }
    }

    #[test]
    fn test_env_rejects_out_of_range_share() {
        assert!(EngineConfig::from_lookup(env(&[("ATTENTION_HYSTERESIS_SHARE", "1.5")])).is_err());
        assert!(EngineConfig::from_lookup(env(&[("ATTENTION_MIN_CALIBRATION_SAMPLES", "0")])).is_err());
    }

    #[test]
    fn test_rejects_zero_fps() {
        let err = EngineConfig::from_json_str(r#"{"governor": {"target_fps": 0.0}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_unbalanced_scorer() {
        let mut config = EngineConfig::default();
        config.expression.boredom.weights[0].1 = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let err = EngineConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_min_interval_from_target_rate() {
        let governor = GovernorConfig {
            target_fps: 20.0,
            ..Default::default()
        };
        assert!((governor.min_interval_ms() - 50.0).abs() < 1e-9);
    }
}
