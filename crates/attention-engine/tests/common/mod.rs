#![allow(dead_code)]

use attention_engine::{BlendshapeFeatures, FaceObservation, FeatureFrame, HeadTransform, Point3D};

const LEFT_EYE_CONTOUR: [usize; 16] = [
    33, 246, 161, 160, 159, 158, 157, 173, 133, 155, 154, 153, 145, 144, 163, 7,
];
const RIGHT_EYE_CONTOUR: [usize; 16] = [
    362, 398, 384, 385, 386, 387, 388, 466, 263, 249, 390, 373, 374, 380, 381, 382,
];

/// 478-point mesh whose eyes are unit-wide rectangles of height `openness`,
/// so both the 6-point and 16-point EAR equal `openness` for a frontal face.
pub fn mesh_with_eyes(openness: f64) -> Vec<Point3D> {
    let mut landmarks = vec![Point3D::default(); 478];
    for (contour, x_offset) in [(&LEFT_EYE_CONTOUR, 0.0), (&RIGHT_EYE_CONTOUR, 2.0)] {
        landmarks[contour[0]] = Point3D::new(x_offset, 0.0, 0.0);
        landmarks[contour[8]] = Point3D::new(x_offset + 1.0, 0.0, 0.0);
        for upper in 1..8 {
            let lower = 16 - upper;
            let x = x_offset + upper as f64 / 8.0;
            landmarks[contour[upper]] = Point3D::new(x, openness / 2.0, 0.0);
            landmarks[contour[lower]] = Point3D::new(x, -openness / 2.0, 0.0);
        }
    }
    landmarks
}

pub fn observation(openness: f64, timestamp_ms: u64) -> FaceObservation {
    FaceObservation {
        landmarks: mesh_with_eyes(openness),
        transform: Some(HeadTransform::identity()),
        blendshapes: Some(BlendshapeFeatures::default()),
        timestamp_ms,
    }
}

pub fn attentive_frame(timestamp_ms: u64) -> FeatureFrame {
    FeatureFrame {
        left_ear: 0.3,
        right_ear: 0.3,
        average_ear: 0.3,
        is_pose_attentive: true,
        is_eyes_open: true,
        confidence: 0.9,
        timestamp_ms,
        has_head_pose: true,
        has_blendshapes: true,
        ..Default::default()
    }
}

pub fn drowsy_frame(timestamp_ms: u64) -> FeatureFrame {
    let mut frame = attentive_frame(timestamp_ms);
    frame.left_ear = 0.08;
    frame.right_ear = 0.08;
    frame.average_ear = 0.08;
    frame.is_eyes_open = false;
    frame.blendshapes.eye_blink_left = 0.8;
    frame.blendshapes.eye_blink_right = 0.8;
    frame
}

pub fn yawning_frame(timestamp_ms: u64) -> FeatureFrame {
    let mut frame = attentive_frame(timestamp_ms);
    frame.yaw = 50.0;
    frame.blendshapes.jaw_open = 0.85;
    frame
}
