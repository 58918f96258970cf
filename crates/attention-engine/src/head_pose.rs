//! Head orientation from the detector's facial transformation matrix.

use serde::{Deserialize, Serialize};

use crate::types::HeadPose;

/// Storage order of the 16 matrix entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixLayout {
    /// MediaPipe's order: `data[0..4]` is column 0.
    #[default]
    ColumnMajor,
    RowMajor,
}

/// 4x4 rigid transform of the face relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadTransform {
    pub data: [f64; 16],
    #[serde(default)]
    pub layout: MatrixLayout,
}

impl HeadTransform {
    pub fn column_major(data: [f64; 16]) -> Self {
        Self {
            data,
            layout: MatrixLayout::ColumnMajor,
        }
    }

    pub fn row_major(data: [f64; 16]) -> Self {
        Self {
            data,
            layout: MatrixLayout::RowMajor,
        }
    }

    /// Builds a transform from a flat slice; `None` if fewer than 16 values.
    pub fn from_slice(values: &[f64], layout: MatrixLayout) -> Option<Self> {
        let data: [f64; 16] = values.get(..16)?.try_into().ok()?;
        Some(Self { data, layout })
    }

    pub fn identity() -> Self {
        let mut data = [0.0; 16];
        data[0] = 1.0;
        data[5] = 1.0;
        data[10] = 1.0;
        data[15] = 1.0;
        Self::column_major(data)
    }

    /// Rotation entry at `row`, `col`.
    #[inline]
    fn at(&self, row: usize, col: usize) -> f64 {
        match self.layout {
            MatrixLayout::ColumnMajor => self.data[col * 4 + row],
            MatrixLayout::RowMajor => self.data[row * 4 + col],
        }
    }

    /// Euler angles (ZYX order) in degrees.
    pub fn head_pose(&self) -> HeadPose {
        let r00 = self.at(0, 0);
        let r10 = self.at(1, 0);
        let r20 = self.at(2, 0);
        let r21 = self.at(2, 1);
        let r22 = self.at(2, 2);

        let pitch = r21.atan2(r22);
        // asin is undefined outside [-1, 1]; matrices with scale noise can overshoot.
        let yaw = (-r20).clamp(-1.0, 1.0).asin();
        let roll = r10.atan2(r00);

        HeadPose {
            yaw: sanitize(yaw.to_degrees()),
            pitch: sanitize(pitch.to_degrees()),
            roll: sanitize(roll.to_degrees()),
        }
    }
}

#[inline]
fn sanitize(angle: f64) -> f64 {
    if angle.is_finite() {
        angle
    } else {
        0.0
    }
}
