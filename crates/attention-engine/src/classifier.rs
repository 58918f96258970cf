//! Rule-based attention classification.
//!
//! Rules are checked in priority order and the first match wins, so a
//! yawn is reported even when the head is also turned away.

use crate::config::ClassifierConfig;
use crate::thresholds::ThresholdSet;
use crate::types::{AttentionState, AttentionVerdict, FeatureFrame};

const UNKNOWN_CONFIDENCE_SCALE: f64 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct AttentionClassifier {
    config: ClassifierConfig,
}

impl AttentionClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, frame: &FeatureFrame, thresholds: &ThresholdSet) -> AttentionVerdict {
        let state = self.state_for(frame, thresholds);
        let confidence = match state {
            AttentionState::Unknown => frame.confidence * UNKNOWN_CONFIDENCE_SCALE,
            _ => frame.confidence,
        };

        AttentionVerdict {
            state,
            confidence: confidence.clamp(0.0, 1.0),
            features: *frame,
            timestamp_ms: frame.timestamp_ms,
        }
    }

    fn state_for(&self, frame: &FeatureFrame, thresholds: &ThresholdSet) -> AttentionState {
        let bs = &frame.blendshapes;

        if bs.jaw_open > thresholds.yawn {
            return AttentionState::Yawning;
        }

        let look_out = bs.eye_look_out_left.max(bs.eye_look_out_right);
        if frame.yaw.abs() > thresholds.adjusted_yaw() || look_out > thresholds.look_side {
            return AttentionState::DistractedLookingAway;
        }

        let look_down = bs.eye_look_down_left.max(bs.eye_look_down_right);
        if look_down > thresholds.look_down && frame.pitch < self.config.look_down_pitch {
            return AttentionState::DistractedLookingAway;
        }

        let blink = bs.eye_blink_left.max(bs.eye_blink_right);
        if !frame.is_eyes_open && blink > thresholds.blink {
            return AttentionState::DrowsyFatigued;
        }

        let brow_down = bs.brow_down() > thresholds.brow_down;
        let pose_attentive = frame.has_head_pose && frame.is_pose_attentive;
        if pose_attentive && frame.is_eyes_open {
            if brow_down
                && bs.eye_squint() > thresholds.eye_squint
                && bs.mouth_press() > thresholds.mouth_press
            {
                return AttentionState::ThinkingConcentrating;
            }
            let look_up = bs.eye_look_up_left.max(bs.eye_look_up_right);
            if look_up > thresholds.look_up {
                return AttentionState::DistractedLookingAway;
            }
            return AttentionState::Attentive;
        }

        if brow_down && bs.brow_inner_up > self.config.confused_brow_inner_up {
            return AttentionState::Confused;
        }

        AttentionState::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlendshapeFeatures;

    fn attentive_frame() -> FeatureFrame {
        FeatureFrame {
            left_ear: 0.3,
            right_ear: 0.3,
            average_ear: 0.3,
            is_pose_attentive: true,
            is_eyes_open: true,
            confidence: 0.9,
            has_head_pose: true,
            has_blendshapes: true,
            ..Default::default()
        }
    }

    fn classify(frame: &FeatureFrame) -> AttentionState {
        AttentionClassifier::default()
            .classify(frame, &ThresholdSet::default())
            .state
    }

    #[test]
    fn test_attentive_baseline() {
        let verdict = AttentionClassifier::default().classify(&attentive_frame(), &ThresholdSet::default());
        assert_eq!(verdict.state, AttentionState::Attentive);
        assert_eq!(verdict.confidence, 0.9);
    }

    #[test]
    fn test_yawning_wins_over_looking_away() {
        let mut frame = attentive_frame();
        frame.yaw = 60.0;
        frame.blendshapes.jaw_open = 0.8;
        assert_eq!(classify(&frame), AttentionState::Yawning);
    }

    #[test]
    fn test_turned_head_and_side_gaze() {
        let mut frame = attentive_frame();
        frame.yaw = -30.0;
        assert_eq!(classify(&frame), AttentionState::DistractedLookingAway);

        let mut frame = attentive_frame();
        frame.blendshapes.eye_look_out_right = 0.6;
        assert_eq!(classify(&frame), AttentionState::DistractedLookingAway);
    }

    #[test]
    fn test_look_down_needs_pitch() {
        let mut frame = attentive_frame();
        frame.blendshapes.eye_look_down_left = 0.7;
        frame.pitch = -5.0;
        assert_eq!(classify(&frame), AttentionState::Attentive);
        frame.pitch = -18.0;
        assert_eq!(classify(&frame), AttentionState::DistractedLookingAway);
    }

    #[test]
    fn test_closed_eyes_with_blink_is_drowsy() {
        let mut frame = attentive_frame();
        frame.is_eyes_open = false;
        frame.blendshapes.eye_blink_left = 0.7;
        assert_eq!(classify(&frame), AttentionState::DrowsyFatigued);
    }

    #[test]
    fn test_concentration_needs_all_three_cues() {
        let mut frame = attentive_frame();
        frame.blendshapes = BlendshapeFeatures {
            brow_down_left: 0.6,
            brow_down_right: 0.6,
            eye_squint_left: 0.5,
            eye_squint_right: 0.5,
            ..Default::default()
        };
        assert_eq!(classify(&frame), AttentionState::Attentive);

        frame.blendshapes.mouth_press_left = 0.4;
        frame.blendshapes.mouth_press_right = 0.4;
        assert_eq!(classify(&frame), AttentionState::ThinkingConcentrating);
    }

    #[test]
    fn test_look_up_while_attentive_is_distracted() {
        let mut frame = attentive_frame();
        frame.blendshapes.eye_look_up_left = 0.6;
        assert_eq!(classify(&frame), AttentionState::DistractedLookingAway);
    }

    #[test]
    fn test_confused_when_pose_not_attentive() {
        let mut frame = attentive_frame();
        frame.is_pose_attentive = false;
        frame.blendshapes.brow_down_left = 0.5;
        frame.blendshapes.brow_down_right = 0.5;
        frame.blendshapes.brow_inner_up = 0.4;
        assert_eq!(classify(&frame), AttentionState::Confused);
    }

    #[test]
    fn test_missing_transform_is_never_attentive() {
        let mut frame = attentive_frame();
        frame.has_head_pose = false;
        let verdict = AttentionClassifier::default().classify(&frame, &ThresholdSet::default());
        assert_eq!(verdict.state, AttentionState::Unknown);
        assert!((verdict.confidence - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_dim_light_widens_yaw_tolerance() {
        let mut frame = attentive_frame();
        frame.yaw = 28.0;
        let dim = ThresholdSet::default().with_environment(1.2, 1.0);
        let verdict = AttentionClassifier::default().classify(&frame, &dim);
        assert_eq!(verdict.state, AttentionState::Attentive);
    }
}
