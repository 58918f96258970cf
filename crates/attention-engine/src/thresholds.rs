//! Classification thresholds and the environment multipliers applied to them.

use serde::{Deserialize, Serialize};

/// Threshold values read by feature extraction and the classifier.
///
/// `lighting_factor` and `distance_factor` are kept separate from the base
/// values; the `adjusted_*` accessors apply them at read time so a change in
/// lighting never leaks into calibrated or persisted numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSet {
    /// Eye aspect ratio below which the eyes count as closed
    pub ear: f64,
    /// Degrees
    pub yaw: f64,
    /// Degrees
    pub pitch: f64,
    /// Degrees
    pub roll: f64,
    pub yawn: f64,
    pub blink: f64,
    pub look_side: f64,
    pub look_down: f64,
    pub look_up: f64,
    pub brow_down: f64,
    pub eye_squint: f64,
    pub mouth_press: f64,
    pub lighting_factor: f64,
    pub distance_factor: f64,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            ear: 0.15,
            yaw: 25.0,
            pitch: 20.0,
            roll: 25.0,
            yawn: 0.5,
            blink: 0.5,
            look_side: 0.5,
            look_down: 0.5,
            look_up: 0.5,
            brow_down: 0.4,
            eye_squint: 0.4,
            mouth_press: 0.3,
            lighting_factor: 1.0,
            distance_factor: 1.0,
        }
    }
}

impl ThresholdSet {
    fn environment_factor(&self) -> f64 {
        self.lighting_factor * self.distance_factor
    }

    pub fn adjusted_ear(&self) -> f64 {
        self.ear * self.environment_factor()
    }

    pub fn adjusted_yaw(&self) -> f64 {
        self.yaw * self.environment_factor()
    }

    pub fn adjusted_pitch(&self) -> f64 {
        self.pitch * self.environment_factor()
    }

    /// Copy carrying new environment multipliers; base values are untouched.
    pub fn with_environment(&self, lighting_factor: f64, distance_factor: f64) -> Self {
        Self {
            lighting_factor,
            distance_factor,
            ..*self
        }
    }
}

/// Multiplier for ambient brightness in [0, 1].
pub fn lighting_factor(brightness: f64) -> f64 {
    if brightness < 0.3 {
        1.2
    } else if brightness > 0.8 {
        0.9
    } else {
        1.0
    }
}

/// Multiplier for the face's size relative to the frame, in [0, 1].
pub fn distance_factor(face_size: f64) -> f64 {
    if face_size < 0.3 {
        1.3
    } else if face_size > 0.7 {
        0.8
    } else {
        1.0
    }
}
