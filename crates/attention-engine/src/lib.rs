//! Attention Engine
//!
//! Streaming attention, expression and engagement inference over the output
//! of a facial landmark detector. Each admitted frame goes through EAR and
//! head-pose feature extraction, rule classification, temporal smoothing and
//! engagement scoring, with per-user thresholds learned by calibration.
//!
//! ```no_run
//! use attention_engine::{EngagementPipeline, FaceObservation};
//!
//! let mut pipeline = EngagementPipeline::with_defaults();
//! let observation = FaceObservation::default();
//! if let Some(report) = pipeline.on_observation(&observation, 0) {
//!     println!("{:?} {:.2}", report.attention.state, report.overall_engagement);
//! }
//! ```

pub mod calibration;
pub mod classifier;
pub mod config;
pub mod ear;
pub mod engagement;
pub mod error;
pub mod expression;
pub mod features;
pub mod governor;
pub mod head_pose;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod ring;
pub mod smoother;
pub mod store;
pub mod thresholds;
pub mod types;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use calibration::{AdaptiveThresholdStore, CalibrationBaseline, CalibrationPhase};
pub use classifier::AttentionClassifier;
pub use config::EngineConfig;
pub use ear::{BlinkAssessment, EarCalculator, EarReading};
pub use engagement::EngagementCombiner;
pub use error::{Error, Result};
pub use expression::ExpressionScorer;
pub use features::{FaceObservation, FeatureExtractor};
pub use governor::{FrameGovernor, PerformanceStats, StatusCache, UiDecision};
pub use head_pose::{HeadTransform, MatrixLayout};
pub use pipeline::{EngagementPipeline, PipelineListener};
pub use pool::{PoolGuard, ScratchPool};
pub use ring::RingHistory;
pub use smoother::TemporalSmoother;
pub use store::{CalibrationStore, JsonFileStore, MemoryStore};
pub use thresholds::ThresholdSet;
pub use types::{
    AttentionState, AttentionVerdict, BlendshapeFeatures, EngagementReport, ExpressionState,
    ExpressionVerdict, FeatureFrame, HeadPose, Point3D,
};
