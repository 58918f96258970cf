//! Turns one detector result into a [`FeatureFrame`].

use serde::{Deserialize, Serialize};

use crate::config::EarConfig;
use crate::ear::{BlinkAssessment, EarCalculator, EarReading};
use crate::head_pose::HeadTransform;
use crate::thresholds::ThresholdSet;
use crate::types::{clamp01, BlendshapeFeatures, FeatureFrame, HeadPose, Point3D};

// Confidence multipliers for missing detector outputs.
const MISSING_TRANSFORM_PENALTY: f64 = 0.7;
const MISSING_BLENDSHAPES_PENALTY: f64 = 0.8;
const MISSING_LANDMARKS_PENALTY: f64 = 0.3;

/// Raw output of the landmark detector for a single face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub landmarks: Vec<Point3D>,
    #[serde(default)]
    pub transform: Option<HeadTransform>,
    #[serde(default)]
    pub blendshapes: Option<BlendshapeFeatures>,
    pub timestamp_ms: u64,
}

pub struct FeatureExtractor {
    ear: EarCalculator,
    last_reading: EarReading,
}

impl FeatureExtractor {
    pub fn new(config: EarConfig) -> Self {
        Self {
            ear: EarCalculator::new(config),
            last_reading: EarReading::ZERO,
        }
    }

    /// Builds the feature frame, judging pose and eyes against `thresholds`.
    ///
    /// A missing transform leaves the angles at zero and the pose flag false.
    pub fn extract(&mut self, observation: &FaceObservation, thresholds: &ThresholdSet) -> FeatureFrame {
        let pose = observation.transform.as_ref().map(HeadTransform::head_pose);
        let reading = self.ear.calculate(&observation.landmarks, pose);
        self.last_reading = reading;

        let angles = pose.unwrap_or_default();
        let is_pose_attentive = pose.is_some() && pose_within(&angles, thresholds);
        let is_eyes_open = reading.is_valid() && reading.average > thresholds.adjusted_ear();

        let mut confidence = 1.0;
        if pose.is_none() {
            confidence *= MISSING_TRANSFORM_PENALTY;
        }
        if observation.blendshapes.is_none() {
            confidence *= MISSING_BLENDSHAPES_PENALTY;
        }
        if !reading.is_valid() {
            confidence *= MISSING_LANDMARKS_PENALTY;
        }

        FeatureFrame {
            yaw: angles.yaw,
            pitch: angles.pitch,
            roll: angles.roll,
            left_ear: reading.left,
            right_ear: reading.right,
            average_ear: reading.average,
            blendshapes: observation.blendshapes.unwrap_or_default(),
            is_pose_attentive,
            is_eyes_open,
            confidence: clamp01(confidence),
            timestamp_ms: observation.timestamp_ms,
            has_head_pose: pose.is_some(),
            has_blendshapes: observation.blendshapes.is_some(),
        }
    }

    /// Blink check on the most recent frame.
    pub fn blink(&self, thresholds: &ThresholdSet) -> BlinkAssessment {
        self.ear.assess_blink(self.last_reading.average, thresholds.adjusted_ear())
    }

    pub fn reset(&mut self) {
        self.ear.reset();
        self.last_reading = EarReading::ZERO;
    }
}

fn pose_within(pose: &HeadPose, thresholds: &ThresholdSet) -> bool {
    pose.yaw.abs() <= thresholds.adjusted_yaw()
        && pose.pitch.abs() <= thresholds.adjusted_pitch()
        && pose.roll.abs() <= thresholds.roll
}
