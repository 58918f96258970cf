//! Browser bindings.
//!
//! Inputs are flat numeric slices so the frontend can hand over typed arrays
//! straight from the detector without building objects per frame.

use std::sync::Arc;

use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::features::FaceObservation;
use crate::head_pose::{HeadTransform, MatrixLayout};
use crate::pipeline::EngagementPipeline;
use crate::store::MemoryStore;
use crate::types::{AttentionState, BlendshapeFeatures, EngagementReport, Point3D};

#[wasm_bindgen]
#[derive(Clone, Copy)]
pub struct EngagementSnapshot {
    /// Index into the attention state list, see `attention_state_name`
    pub attention_state: u8,
    pub attention_confidence: f64,
    pub expression_state: u8,
    pub expression_confidence: f64,
    pub expression_intensity: f64,
    pub engagement: f64,
    pub average_ear: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    /// False when the frame was dropped by the governor
    pub is_valid: bool,
}

impl EngagementSnapshot {
    fn dropped() -> Self {
        Self {
            attention_state: AttentionState::Unknown.index() as u8,
            attention_confidence: 0.0,
            expression_state: 0,
            expression_confidence: 0.0,
            expression_intensity: 0.0,
            engagement: 0.0,
            average_ear: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            is_valid: false,
        }
    }
}

impl From<&EngagementReport> for EngagementSnapshot {
    fn from(report: &EngagementReport) -> Self {
        let features = &report.attention.features;
        Self {
            attention_state: report.attention.state.index() as u8,
            attention_confidence: report.attention.confidence,
            expression_state: report.expression.primary.index() as u8,
            expression_confidence: report.expression.confidence,
            expression_intensity: report.expression.intensity,
            engagement: report.overall_engagement,
            average_ear: features.average_ear,
            yaw: features.yaw,
            pitch: features.pitch,
            roll: features.roll,
            is_valid: true,
        }
    }
}

#[wasm_bindgen]
pub fn attention_state_name(index: u8) -> String {
    AttentionState::ALL
        .get(index as usize)
        .map_or(AttentionState::Unknown, |s| *s)
        .label()
        .to_string()
}

/// Blendshape category names in the order `process` expects them.
#[wasm_bindgen]
pub fn blendshape_names() -> Vec<JsValue> {
    BlendshapeFeatures::NAMES.iter().map(|n| JsValue::from_str(n)).collect()
}

#[wasm_bindgen]
pub struct AttentionEngine {
    pipeline: EngagementPipeline,
}

#[wasm_bindgen]
impl AttentionEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(target_fps: Option<f64>, ui_update_interval_ms: Option<u32>) -> Self {
        let mut config = EngineConfig::default();
        if let Some(fps) = target_fps.filter(|f| *f > 0.0) {
            config.governor.target_fps = fps;
        }
        if let Some(interval) = ui_update_interval_ms {
            config.governor.ui_update_interval_ms = interval as u64;
        }
        Self {
            pipeline: EngagementPipeline::new(config, Arc::new(MemoryStore::new())),
        }
    }

    /// Creates an engine from a JSON configuration document.
    pub fn from_config_json(json: &str) -> Result<AttentionEngine, JsValue> {
        let config = EngineConfig::from_json_str(json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(Self {
            pipeline: EngagementPipeline::new(config, Arc::new(MemoryStore::new())),
        })
    }

    /// Runs one detector result.
    ///
    /// `landmarks` is `[x0, y0, z0, x1, y1, z1, ...]`; `matrix` is the
    /// column-major facial transform or empty; `blendshapes` holds scores in
    /// `blendshape_names()` order or is empty.
    pub fn process(&mut self, landmarks: &[f64], matrix: &[f64], blendshapes: &[f64], now_ms: f64) -> EngagementSnapshot {
        let observation = FaceObservation {
            landmarks: landmarks
                .chunks_exact(3)
                .map(|p| Point3D::new(p[0], p[1], p[2]))
                .collect(),
            transform: HeadTransform::from_slice(matrix, MatrixLayout::ColumnMajor),
            blendshapes: (!blendshapes.is_empty()).then(|| {
                BlendshapeFeatures::from_categories(
                    BlendshapeFeatures::NAMES.iter().copied().zip(blendshapes.iter().copied()),
                )
            }),
            timestamp_ms: now_ms.max(0.0) as u64,
        };

        self.pipeline
            .on_observation(&observation, observation.timestamp_ms)
            .map_or_else(EngagementSnapshot::dropped, |report| EngagementSnapshot::from(&report))
    }

    /// Full report for the last processed frame as a JS object, or `null`.
    pub fn last_report(&self) -> Result<JsValue, JsValue> {
        match self.pipeline.last_report() {
            Some(report) => serde_wasm_bindgen::to_value(report).map_err(JsValue::from),
            None => Ok(JsValue::NULL),
        }
    }

    pub fn status_text(&self, now_ms: f64) -> Option<String> {
        self.pipeline.status_cache().get(now_ms.max(0.0) as u64)
    }

    pub fn record_processing_time(&mut self, elapsed_ms: f64) {
        self.pipeline.record_processing_time(elapsed_ms);
    }

    pub fn update_environment(&self, brightness: f64, face_size: f64) {
        self.pipeline.update_environment(brightness, face_size);
    }

    pub fn start_calibration(&self) {
        self.pipeline.start_calibration();
    }

    pub fn finish_calibration(&self) -> bool {
        self.pipeline.finish_calibration()
    }

    pub fn calibration_progress(&self) -> f64 {
        self.pipeline.calibration_progress()
    }

    pub fn is_calibrated(&self) -> bool {
        self.pipeline.is_calibrated()
    }

    pub fn reset_thresholds(&self) {
        self.pipeline.reset_thresholds();
    }

    pub fn reinforce(&self, predicted: u8, actual: u8) -> bool {
        let lookup = |i: u8| AttentionState::ALL.get(i as usize).copied();
        match (lookup(predicted), lookup(actual)) {
            (Some(predicted), Some(actual)) => self.pipeline.reinforce(predicted, actual),
            _ => false,
        }
    }

    pub fn performance_stats(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.pipeline.performance_stats()).map_err(JsValue::from)
    }

    pub fn reset(&mut self) {
        self.pipeline.reset();
    }
}
