//! Common Types
//!
//! Data structures shared by every stage of the per-frame pipeline.

use serde::{Deserialize, Serialize};

/// Clamp into [0, 1], mapping NaN to 0.
#[inline]
pub(crate) fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ==================== Geometry ====================

/// Normalized landmark position as produced by the face mesh model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Head orientation in degrees. Negative pitch means looking down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

// ==================== Blendshapes ====================

macro_rules! blendshape_slots {
    ($($field:ident => $name:literal),+ $(,)?) => {
        /// The 33 facial activations the pipeline consumes, keyed by their
        /// MediaPipe category names. Every score lies in [0, 1].
        #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase", default)]
        pub struct BlendshapeFeatures {
            $(pub $field: f64,)+
        }

        impl BlendshapeFeatures {
            /// Category names in slot order.
            pub const NAMES: [&'static str; BLENDSHAPE_SLOTS] = [$($name),+];

            /// Score for a MediaPipe category name; `None` for names outside the 33 slots.
            pub fn get(&self, name: &str) -> Option<f64> {
                match name {
                    $($name => Some(self.$field),)+
                    _ => None,
                }
            }

            fn slot_mut(&mut self, name: &str) -> Option<&mut f64> {
                match name {
                    $($name => Some(&mut self.$field),)+
                    _ => None,
                }
            }
        }
    };
}

/// Number of named activation slots.
pub const BLENDSHAPE_SLOTS: usize = 33;

blendshape_slots! {
    brow_down_left => "browDownLeft",
    brow_down_right => "browDownRight",
    brow_inner_up => "browInnerUp",
    brow_outer_up_left => "browOuterUpLeft",
    brow_outer_up_right => "browOuterUpRight",
    cheek_squint_left => "cheekSquintLeft",
    cheek_squint_right => "cheekSquintRight",
    eye_blink_left => "eyeBlinkLeft",
    eye_blink_right => "eyeBlinkRight",
    eye_look_down_left => "eyeLookDownLeft",
    eye_look_down_right => "eyeLookDownRight",
    eye_look_in_left => "eyeLookInLeft",
    eye_look_in_right => "eyeLookInRight",
    eye_look_out_left => "eyeLookOutLeft",
    eye_look_out_right => "eyeLookOutRight",
    eye_look_up_left => "eyeLookUpLeft",
    eye_look_up_right => "eyeLookUpRight",
    eye_squint_left => "eyeSquintLeft",
    eye_squint_right => "eyeSquintRight",
    eye_wide_left => "eyeWideLeft",
    eye_wide_right => "eyeWideRight",
    jaw_open => "jawOpen",
    mouth_frown_left => "mouthFrownLeft",
    mouth_frown_right => "mouthFrownRight",
    mouth_press_left => "mouthPressLeft",
    mouth_press_right => "mouthPressRight",
    mouth_smile_left => "mouthSmileLeft",
    mouth_smile_right => "mouthSmileRight",
    mouth_stretch_left => "mouthStretchLeft",
    mouth_stretch_right => "mouthStretchRight",
    mouth_pucker => "mouthPucker",
    nose_sneer_left => "noseSneerLeft",
    nose_sneer_right => "noseSneerRight",
}

impl BlendshapeFeatures {
    /// Builds the vector from `(categoryName, score)` pairs.
    ///
    /// Unknown categories are ignored and scores are clamped into [0, 1].
    pub fn from_categories<'a, I>(categories: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut features = Self::default();
        for (name, score) in categories {
            if let Some(slot) = features.slot_mut(name) {
                *slot = clamp01(score);
            }
        }
        features
    }

    pub fn brow_down(&self) -> f64 {
        (self.brow_down_left + self.brow_down_right) / 2.0
    }

    pub fn brow_outer_up(&self) -> f64 {
        (self.brow_outer_up_left + self.brow_outer_up_right) / 2.0
    }

    pub fn cheek_squint(&self) -> f64 {
        (self.cheek_squint_left + self.cheek_squint_right) / 2.0
    }

    pub fn eye_blink(&self) -> f64 {
        (self.eye_blink_left + self.eye_blink_right) / 2.0
    }

    pub fn eye_look_down(&self) -> f64 {
        (self.eye_look_down_left + self.eye_look_down_right) / 2.0
    }

    pub fn eye_squint(&self) -> f64 {
        (self.eye_squint_left + self.eye_squint_right) / 2.0
    }

    pub fn eye_wide(&self) -> f64 {
        (self.eye_wide_left + self.eye_wide_right) / 2.0
    }

    pub fn mouth_frown(&self) -> f64 {
        (self.mouth_frown_left + self.mouth_frown_right) / 2.0
    }

    pub fn mouth_press(&self) -> f64 {
        (self.mouth_press_left + self.mouth_press_right) / 2.0
    }

    pub fn mouth_smile(&self) -> f64 {
        (self.mouth_smile_left + self.mouth_smile_right) / 2.0
    }

    pub fn mouth_stretch(&self) -> f64 {
        (self.mouth_stretch_left + self.mouth_stretch_right) / 2.0
    }

    pub fn nose_sneer(&self) -> f64 {
        (self.nose_sneer_left + self.nose_sneer_right) / 2.0
    }
}

// ==================== States ====================

/// Discrete attention judgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttentionState {
    Attentive,
    DistractedLookingAway,
    DrowsyFatigued,
    Yawning,
    ThinkingConcentrating,
    Confused,
    Unknown,
}

impl AttentionState {
    pub const ALL: [AttentionState; 7] = [
        AttentionState::Attentive,
        AttentionState::DistractedLookingAway,
        AttentionState::DrowsyFatigued,
        AttentionState::Yawning,
        AttentionState::ThinkingConcentrating,
        AttentionState::Confused,
        AttentionState::Unknown,
    ];

    /// Dense index into per-state tables.
    pub const fn index(self) -> usize {
        match self {
            AttentionState::Attentive => 0,
            AttentionState::DistractedLookingAway => 1,
            AttentionState::DrowsyFatigued => 2,
            AttentionState::Yawning => 3,
            AttentionState::ThinkingConcentrating => 4,
            AttentionState::Confused => 5,
            AttentionState::Unknown => 6,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AttentionState::Attentive => "Attentive",
            AttentionState::DistractedLookingAway => "Looking away",
            AttentionState::DrowsyFatigued => "Drowsy",
            AttentionState::Yawning => "Yawning",
            AttentionState::ThinkingConcentrating => "Concentrating",
            AttentionState::Confused => "Confused",
            AttentionState::Unknown => "Unknown",
        }
    }
}

/// Discrete expression judgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpressionState {
    Neutral,
    Smiling,
    Laughing,
    Surprised,
    Confused,
    Concentrating,
    Bored,
    Frustrated,
    Excited,
    /// No blendshape data was available for the frame.
    Unknown,
}

impl ExpressionState {
    pub const ALL: [ExpressionState; 10] = [
        ExpressionState::Neutral,
        ExpressionState::Smiling,
        ExpressionState::Laughing,
        ExpressionState::Surprised,
        ExpressionState::Confused,
        ExpressionState::Concentrating,
        ExpressionState::Bored,
        ExpressionState::Frustrated,
        ExpressionState::Excited,
        ExpressionState::Unknown,
    ];

    pub const fn index(self) -> usize {
        match self {
            ExpressionState::Neutral => 0,
            ExpressionState::Smiling => 1,
            ExpressionState::Laughing => 2,
            ExpressionState::Surprised => 3,
            ExpressionState::Confused => 4,
            ExpressionState::Concentrating => 5,
            ExpressionState::Bored => 6,
            ExpressionState::Frustrated => 7,
            ExpressionState::Excited => 8,
            ExpressionState::Unknown => 9,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ExpressionState::Neutral => "Neutral",
            ExpressionState::Smiling => "Smiling",
            ExpressionState::Laughing => "Laughing",
            ExpressionState::Surprised => "Surprised",
            ExpressionState::Confused => "Confused",
            ExpressionState::Concentrating => "Concentrating",
            ExpressionState::Bored => "Bored",
            ExpressionState::Frustrated => "Frustrated",
            ExpressionState::Excited => "Excited",
            ExpressionState::Unknown => "Unknown",
        }
    }
}

// ==================== Frames and verdicts ====================

/// Per-frame feature vector handed from extraction to classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    /// Head yaw in degrees
    pub yaw: f64,
    /// Head pitch in degrees (negative = looking down)
    pub pitch: f64,
    /// Head roll in degrees
    pub roll: f64,
    pub left_ear: f64,
    pub right_ear: f64,
    pub average_ear: f64,
    pub blendshapes: BlendshapeFeatures,
    pub is_pose_attentive: bool,
    pub is_eyes_open: bool,
    /// Data-quality confidence [0, 1]
    pub confidence: f64,
    /// Capture time in milliseconds
    pub timestamp_ms: u64,
    /// False when the detector produced no head transform
    pub has_head_pose: bool,
    /// False when the detector produced no blendshape scores
    pub has_blendshapes: bool,
}

impl Default for FeatureFrame {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            left_ear: 0.0,
            right_ear: 0.0,
            average_ear: 0.0,
            blendshapes: BlendshapeFeatures::default(),
            is_pose_attentive: false,
            is_eyes_open: false,
            confidence: 0.0,
            timestamp_ms: 0,
            has_head_pose: false,
            has_blendshapes: false,
        }
    }
}

impl FeatureFrame {
    pub fn head_pose(&self) -> HeadPose {
        HeadPose {
            yaw: self.yaw,
            pitch: self.pitch,
            roll: self.roll,
        }
    }
}

/// Attention classification for one frame (raw or smoothed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttentionVerdict {
    pub state: AttentionState,
    /// [0, 1]
    pub confidence: f64,
    pub features: FeatureFrame,
    pub timestamp_ms: u64,
}

/// Expression classification for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpressionVerdict {
    pub primary: ExpressionState,
    /// [0, 1]
    pub confidence: f64,
    pub secondary: Option<ExpressionState>,
    /// [0, 1]
    pub intensity: f64,
}

impl ExpressionVerdict {
    pub fn unknown() -> Self {
        Self {
            primary: ExpressionState::Unknown,
            confidence: 0.0,
            secondary: None,
            intensity: 0.0,
        }
    }
}

/// Combined per-frame output delivered to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementReport {
    pub attention: AttentionVerdict,
    pub expression: ExpressionVerdict,
    /// [0, 1]
    pub overall_engagement: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blendshape_names_match_slot_count() {
        assert_eq!(BlendshapeFeatures::NAMES.len(), BLENDSHAPE_SLOTS);
        let features = BlendshapeFeatures::default();
        for name in BlendshapeFeatures::NAMES {
            assert_eq!(features.get(name), Some(0.0), "slot {name} missing");
        }
    }

    #[test]
    fn test_from_categories_clamps_and_ignores_unknown() {
        let features = BlendshapeFeatures::from_categories([
            ("jawOpen", 0.8),
            ("mouthSmileLeft", 1.7),
            ("tongueOut", 0.9),
            ("browInnerUp", -0.2),
        ]);
        assert_eq!(features.jaw_open, 0.8);
        assert_eq!(features.mouth_smile_left, 1.0);
        assert_eq!(features.brow_inner_up, 0.0);
        assert_eq!(features.get("tongueOut"), None);
    }

    #[test]
    fn test_blendshapes_serialize_with_category_names() {
        let mut features = BlendshapeFeatures::default();
        features.eye_look_out_left = 0.4;
        let json = serde_json::to_value(features).unwrap();
        assert_eq!(json["eyeLookOutLeft"], 0.4);

        let partial: BlendshapeFeatures =
            serde_json::from_str(r#"{"jawOpen": 0.6}"#).unwrap();
        assert_eq!(partial.jaw_open, 0.6);
        assert_eq!(partial.brow_down_left, 0.0);
    }

    #[test]
    fn test_state_indices_are_dense() {
        for (i, state) in AttentionState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
        for (i, state) in ExpressionState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
    }

    #[test]
    fn test_clamp01_handles_nan() {
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(2.0), 1.0);
        assert_eq!(clamp01(-1.0), 0.0);
    }
}
