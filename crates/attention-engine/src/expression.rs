//! Expression scoring from blendshape activations.

use crate::config::ExpressionConfig;
use crate::ring::RingHistory;
use crate::types::{clamp01, BlendshapeFeatures, ExpressionState, ExpressionVerdict};

pub struct ExpressionScorer {
    config: ExpressionConfig,
    history: RingHistory<ExpressionVerdict>,
    intensity: Option<f64>,
    last_primary: Option<ExpressionState>,
}

impl ExpressionScorer {
    pub fn new(config: ExpressionConfig) -> Self {
        let history_size = config.history_size;
        Self {
            config,
            history: RingHistory::new(history_size),
            intensity: None,
            last_primary: None,
        }
    }

    /// Scores one frame. `None` means the detector produced no blendshapes.
    pub fn score(&mut self, blendshapes: Option<&BlendshapeFeatures>) -> ExpressionVerdict {
        let verdict = match blendshapes {
            Some(features) => self.evaluate(features),
            None => ExpressionVerdict::unknown(),
        };
        self.history.push(verdict);
        verdict
    }

    fn evaluate(&mut self, features: &BlendshapeFeatures) -> ExpressionVerdict {
        let mut ranked = [(ExpressionState::Neutral, 0.0); 7];
        let mut len = 0;
        for (state, scorer) in self.config.scorers() {
            let score = scorer.score(features);
            if score > scorer.threshold {
                ranked[len] = (state, score);
                len += 1;
            }
        }
        let candidates = &mut ranked[..len];
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        let (primary, confidence, secondary, intensity) = match candidates.first() {
            None => {
                self.intensity = Some(self.config.neutral_intensity);
                (
                    ExpressionState::Neutral,
                    self.config.neutral_confidence,
                    None,
                    self.config.neutral_intensity,
                )
            }
            Some(&(state, score)) => {
                let primary = if state == ExpressionState::Smiling && score > self.config.laugh_threshold {
                    ExpressionState::Laughing
                } else {
                    state
                };
                let secondary = candidates
                    .get(1)
                    .filter(|(_, s)| *s > self.config.secondary_threshold)
                    .map(|(state, _)| *state);
                let intensity = self.filter_intensity(clamp01(score).powi(2));
                (primary, clamp01(score), secondary, intensity)
            }
        };

        let confidence = match self.last_primary {
            Some(previous) if previous != primary => confidence * self.config.switch_damping,
            _ => confidence,
        };
        self.last_primary = Some(primary);

        ExpressionVerdict {
            primary,
            confidence: clamp01(confidence),
            secondary,
            intensity: clamp01(intensity),
        }
    }

    fn filter_intensity(&mut self, raw: f64) -> f64 {
        let persistence = self.config.intensity_persistence;
        let next = match self.intensity {
            Some(previous) => persistence * previous + (1.0 - persistence) * raw,
            None => raw,
        };
        self.intensity = Some(next);
        next
    }

    /// Recent verdicts, oldest first.
    pub fn recent(&self) -> Vec<ExpressionVerdict> {
        self.history.snapshot()
    }

    /// Most frequent primary state in the history; ties go to the most recent.
    pub fn dominant(&self) -> Option<ExpressionState> {
        let mut best: Option<(ExpressionState, usize)> = None;
        for verdict in self.history.iter().rev() {
            let count = self
                .history
                .iter()
                .filter(|v| v.primary == verdict.primary)
                .count();
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((verdict.primary, count));
            }
        }
        best.map(|(state, _)| state)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.intensity = None;
        self.last_primary = None;
    }
}
