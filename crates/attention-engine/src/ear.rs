//! EAR (Eye Aspect Ratio) estimation.
//!
//! Combines the classic 6-point EAR with a 16-point contour average, corrects
//! for head pose, smooths each eye over a short history and blends the two
//! eyes according to head yaw.

use serde::{Deserialize, Serialize};

use crate::config::EarConfig;
use crate::ring::RingHistory;
use crate::types::{clamp01, HeadPose, Point3D};

// MediaPipe Face Mesh eye landmark indices:
// [outer/inner corner, upper lid 1, upper lid 2, other corner, lower lid 2, lower lid 1]
const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

// 16-point contours, clockwise: corner, 7 upper lid points, corner, 7 lower lid points
const LEFT_EYE_CONTOUR: [usize; 16] = [
    33,
    246, 161, 160, 159, 158, 157, 173,
    133,
    155, 154, 153, 145, 144, 163, 7,
];
const RIGHT_EYE_CONTOUR: [usize; 16] = [
    362,
    398, 384, 385, 386, 387, 388, 466,
    263,
    249, 390, 373, 374, 380, 381, 382,
];

// Upper/lower contour positions facing each other across the eye.
const CONTOUR_PAIRS: [(usize, usize); 7] = [(1, 15), (2, 14), (3, 13), (4, 12), (5, 11), (6, 10), (7, 9)];

const MIN_HORIZONTAL: f64 = 0.001;

const fn max_index(indices: &[usize], floor: usize) -> usize {
    let mut max = floor;
    let mut i = 0;
    while i < indices.len() {
        if indices[i] > max {
            max = indices[i];
        }
        i += 1;
    }
    max
}

/// Landmark count needed to cover every eye index used here.
pub const REQUIRED_LANDMARKS: usize = max_index(
    &RIGHT_EYE_CONTOUR,
    max_index(&LEFT_EYE_CONTOUR, max_index(&RIGHT_EYE, max_index(&LEFT_EYE, 0))),
) + 1;

/// Smoothed, pose-corrected eye openness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EarReading {
    pub left: f64,
    pub right: f64,
    pub average: f64,
}

impl EarReading {
    pub const ZERO: EarReading = EarReading {
        left: 0.0,
        right: 0.0,
        average: 0.0,
    };

    pub fn is_valid(&self) -> bool {
        self.average > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlinkAssessment {
    pub is_blink: bool,
    pub confidence: f64,
}

/// Distance with the depth axis down-weighted; MediaPipe z is much noisier than x/y.
#[inline]
fn weighted_distance(p1: &Point3D, p2: &Point3D, depth_weight: f64) -> f64 {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    let dz = (p2.z - p1.z) * depth_weight;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

fn basic_ear(landmarks: &[Point3D], indices: &[usize; 6], depth_weight: f64) -> f64 {
    let p1 = &landmarks[indices[0]];
    let p2 = &landmarks[indices[1]];
    let p3 = &landmarks[indices[2]];
    let p4 = &landmarks[indices[3]];
    let p5 = &landmarks[indices[4]];
    let p6 = &landmarks[indices[5]];

    let vertical1 = weighted_distance(p2, p6, depth_weight);
    let vertical2 = weighted_distance(p3, p5, depth_weight);
    let horizontal = weighted_distance(p1, p4, depth_weight);

    if horizontal < MIN_HORIZONTAL {
        return 0.0;
    }
    (vertical1 + vertical2) / (2.0 * horizontal)
}

fn extended_ear(landmarks: &[Point3D], contour: &[usize; 16], depth_weight: f64) -> f64 {
    let total_vertical: f64 = CONTOUR_PAIRS
        .iter()
        .map(|&(upper, lower)| {
            weighted_distance(&landmarks[contour[upper]], &landmarks[contour[lower]], depth_weight)
        })
        .sum();
    let avg_vertical = total_vertical / CONTOUR_PAIRS.len() as f64;
    let horizontal = weighted_distance(&landmarks[contour[0]], &landmarks[contour[8]], depth_weight);

    if horizontal < MIN_HORIZONTAL {
        return 0.0;
    }
    avg_vertical / horizontal
}

/// Multiplicative EAR correction for head orientation, clamped to the configured band.
///
/// Looking up (positive pitch) inflates the ratio, looking down deflates it.
pub fn pose_correction_factor(pose: &HeadPose, config: &EarConfig) -> f64 {
    let yaw = pose.yaw.to_radians().abs();
    let pitch = pose.pitch.to_radians();
    let roll = pose.roll.to_radians().abs();

    let factor = (1.0 + yaw * config.yaw_correction)
        * (1.0 + pitch * config.pitch_correction)
        * (1.0 + roll * config.roll_correction);
    factor.clamp(config.min_correction, config.max_correction)
}

/// Yaw-weighted blend of both eyes.
pub fn bilateral_average(left: f64, right: f64, yaw_degrees: f64) -> f64 {
    let left_weight = (yaw_degrees.to_radians().cos() + 1.0) / 2.0;
    left * left_weight + right * (1.0 - left_weight)
}

pub struct EarCalculator {
    config: EarConfig,
    left_history: RingHistory<f64>,
    right_history: RingHistory<f64>,
    // Last two bilateral averages, for the blink change rate.
    average_history: RingHistory<f64>,
}

impl EarCalculator {
    pub fn new(config: EarConfig) -> Self {
        let history_size = config.history_size;
        Self {
            config,
            left_history: RingHistory::new(history_size),
            right_history: RingHistory::new(history_size),
            average_history: RingHistory::new(2),
        }
    }

    /// Computes the smoothed EAR triple.
    ///
    /// Returns [`EarReading::ZERO`] without touching the histories when the
    /// landmark list does not cover the eye contours.
    pub fn calculate(&mut self, landmarks: &[Point3D], pose: Option<HeadPose>) -> EarReading {
        if landmarks.len() < REQUIRED_LANDMARKS {
            return EarReading::ZERO;
        }
        let pose = pose.unwrap_or_default();
        let correction = pose_correction_factor(&pose, &self.config);

        let left_raw = self.combined_ear(landmarks, &LEFT_EYE, &LEFT_EYE_CONTOUR);
        let right_raw = self.combined_ear(landmarks, &RIGHT_EYE, &RIGHT_EYE_CONTOUR);

        let left = self.push_and_smooth(Side::Left, left_raw * correction);
        let right = self.push_and_smooth(Side::Right, right_raw * correction);

        let average = finite_or_zero(bilateral_average(left, right, pose.yaw))
            .clamp(self.config.min_ear, self.config.max_ear);
        self.average_history.push(average);

        EarReading { left, right, average }
    }

    /// Blink check against `threshold` using the latest frame-to-frame change.
    pub fn assess_blink(&self, average_ear: f64, threshold: f64) -> BlinkAssessment {
        let change_rate = self.recent_change_rate();
        let is_blink = average_ear < threshold && change_rate > self.config.blink_change_rate;

        let margin = if threshold > 0.0 {
            clamp01((threshold - average_ear) / threshold)
        } else {
            0.0
        };
        let magnitude = if self.config.blink_change_rate > 0.0 {
            clamp01(change_rate / (2.0 * self.config.blink_change_rate))
        } else {
            0.0
        };

        BlinkAssessment {
            is_blink,
            confidence: clamp01(0.6 * margin + 0.4 * magnitude),
        }
    }

    fn recent_change_rate(&self) -> f64 {
        if self.average_history.len() < 2 {
            return 0.0;
        }
        let mut newest_first = self.average_history.iter().rev();
        match (newest_first.next(), newest_first.next()) {
            (Some(latest), Some(previous)) => (latest - previous).abs(),
            _ => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.left_history.clear();
        self.right_history.clear();
        self.average_history.clear();
    }

    fn combined_ear(&self, landmarks: &[Point3D], eye: &[usize; 6], contour: &[usize; 16]) -> f64 {
        let depth = self.config.depth_weight;
        self.config.basic_weight * basic_ear(landmarks, eye, depth)
            + self.config.extended_weight * extended_ear(landmarks, contour, depth)
    }

    fn push_and_smooth(&mut self, side: Side, corrected: f64) -> f64 {
        let (min, max, alpha) = (self.config.min_ear, self.config.max_ear, self.config.smoothing_alpha);
        let history = match side {
            Side::Left => &mut self.left_history,
            Side::Right => &mut self.right_history,
        };
        // A non-finite landmark must not reach the history.
        let corrected = finite_or_zero(corrected);
        history.push(corrected.clamp(min, max));

        // Forward EMA: the newest sample ends up with the largest weight.
        let mut samples = history.iter();
        let smoothed = match samples.next() {
            Some(&oldest) => samples.fold(oldest, |ema, &value| alpha * value + (1.0 - alpha) * ema),
            None => corrected,
        };
        smoothed.clamp(min, max)
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}
