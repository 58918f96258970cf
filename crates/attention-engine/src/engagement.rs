//! Combines attention and expression into one engagement score.

use crate::config::EngagementConfig;
use crate::types::{clamp01, AttentionVerdict, EngagementReport, ExpressionVerdict};

#[derive(Debug, Clone, Default)]
pub struct EngagementCombiner {
    config: EngagementConfig,
}

impl EngagementCombiner {
    pub fn new(config: EngagementConfig) -> Self {
        Self { config }
    }

    /// Engagement in [0, 1].
    ///
    /// Expression contributes more when it is intense, and both verdict
    /// confidences scale the result down.
    pub fn score(&self, attention: &AttentionVerdict, expression: &ExpressionVerdict) -> f64 {
        let attention_score = self.config.attention_scores.score(attention.state);
        let expression_score = self.config.expression_scores.score(expression.primary);
        let intensity_boost = 0.5 + 0.5 * expression.intensity;

        let combined = attention_score * self.config.attention_weight
            + expression_score * self.config.expression_weight * intensity_boost;
        clamp01(combined * attention.confidence * expression.confidence)
    }

    pub fn combine(&self, attention: AttentionVerdict, expression: ExpressionVerdict) -> EngagementReport {
        EngagementReport {
            overall_engagement: self.score(&attention, &expression),
            attention,
            expression,
        }
    }
}
