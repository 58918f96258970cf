//! Temporal smoothing of raw attention verdicts.
//!
//! A decaying weighted vote over the last few verdicts picks a candidate
//! state; hysteresis only lets the reported state change when the candidate
//! holds a clear majority of the vote weight.

use tracing::debug;

use crate::config::SmoothingConfig;
use crate::pool::ScratchPool;
use crate::ring::RingHistory;
use crate::types::{clamp01, AttentionState, AttentionVerdict, HeadPose};

const STATE_COUNT: usize = AttentionState::ALL.len();

pub struct TemporalSmoother {
    config: SmoothingConfig,
    verdicts: RingHistory<AttentionVerdict>,
    ears: RingHistory<f64>,
    poses: RingHistory<HeadPose>,
    stable_state: Option<AttentionState>,
    stability: u32,
    scratch: ScratchPool<Vec<f64>>,
}

impl TemporalSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        let size = config.history_size;
        Self {
            verdicts: RingHistory::new(size),
            ears: RingHistory::new(size),
            poses: RingHistory::new(size),
            stable_state: None,
            stability: 0,
            scratch: ScratchPool::new(2),
            config,
        }
    }

    /// Weight of the sample at `index` (0 = oldest).
    fn weight(&self, index: usize) -> f64 {
        let table = &self.config.decay_weights;
        table
            .get(index)
            .or_else(|| table.last())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn add_and_smooth(&mut self, raw: AttentionVerdict) -> AttentionVerdict {
        self.verdicts.push(raw);
        self.ears.push(raw.features.average_ear);
        self.poses.push(raw.features.head_pose());

        if self.verdicts.len() < self.config.min_history {
            return raw;
        }

        let (winner, share) = self.vote();
        let state = self.apply_hysteresis(winner, share);

        let ear = self.weighted_ear().unwrap_or(raw.features.average_ear);
        let pose = self.weighted_pose().unwrap_or_else(|| raw.features.head_pose());

        let n = self.verdicts.len() as f64;
        let matching = self.verdicts.iter().filter(|v| v.state == raw.state).count() as f64;
        let mean_confidence = self.verdicts.iter().map(|v| v.confidence).sum::<f64>() / n;
        let confidence = clamp01(
            self.config.state_match_weight * (matching / n)
                + self.config.raw_confidence_weight * mean_confidence,
        );

        let mut features = raw.features;
        features.average_ear = ear;
        features.yaw = pose.yaw;
        features.pitch = pose.pitch;
        features.roll = pose.roll;
        features.is_eyes_open = ear > self.config.eyes_open_cutoff;

        AttentionVerdict {
            state,
            confidence,
            features,
            timestamp_ms: raw.timestamp_ms,
        }
    }

    /// Winning state and its share of the total vote weight.
    fn vote(&self) -> (AttentionState, f64) {
        let mut tally = [0.0f64; STATE_COUNT];
        let mut total = 0.0;
        for (i, verdict) in self.verdicts.iter().enumerate() {
            let w = self.weight(i);
            tally[verdict.state.index()] += w;
            total += w;
        }

        let mut winner = AttentionState::Unknown;
        let mut best = f64::NEG_INFINITY;
        for state in AttentionState::ALL {
            if tally[state.index()] > best {
                best = tally[state.index()];
                winner = state;
            }
        }

        let share = if total > 0.0 { best / total } else { 0.0 };
        (winner, share)
    }

    fn apply_hysteresis(&mut self, winner: AttentionState, share: f64) -> AttentionState {
        match self.stable_state {
            Some(stable) if stable == winner => {
                self.stability = self.stability.saturating_add(1);
                stable
            }
            Some(stable) => {
                self.stability = 1;
                if share >= self.config.hysteresis_share {
                    debug!(from = ?stable, to = ?winner, share, "Attention state changed");
                    self.stable_state = Some(winner);
                    winner
                } else {
                    stable
                }
            }
            None => {
                self.stability = 1;
                self.stable_state = Some(winner);
                winner
            }
        }
    }

    fn weighted_ear(&self) -> Option<f64> {
        let mut values = self.scratch.acquire();
        self.ears.snapshot_into(&mut values);
        self.weighted_mean(values.iter().copied())
    }

    fn weighted_pose(&self) -> Option<HeadPose> {
        Some(HeadPose {
            yaw: self.weighted_mean(self.poses.iter().map(|p| p.yaw))?,
            pitch: self.weighted_mean(self.poses.iter().map(|p| p.pitch))?,
            roll: self.weighted_mean(self.poses.iter().map(|p| p.roll))?,
        })
    }

    /// Normalized weighted mean over oldest-first values; `None` when the weights sum to zero.
    fn weighted_mean(&self, values: impl Iterator<Item = f64>) -> Option<f64> {
        let (sum, weight_sum) = values
            .enumerate()
            .fold((0.0, 0.0), |(sum, ws), (i, v)| {
                let w = self.weight(i);
                (sum + v * w, ws + w)
            });
        (weight_sum > 0.0).then(|| sum / weight_sum)
    }

    /// Consecutive frames the reported state has held.
    pub fn stability(&self) -> u32 {
        self.stability
    }

    pub fn is_stable(&self) -> bool {
        self.stability >= self.config.stable_frames
    }

    pub fn stable_state(&self) -> Option<AttentionState> {
        self.stable_state
    }

    pub fn reset(&mut self) {
        self.verdicts.clear();
        self.ears.clear();
        self.poses.clear();
        self.stable_state = None;
        self.stability = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureFrame;

    fn verdict(state: AttentionState, ear: f64, ts: u64) -> AttentionVerdict {
        AttentionVerdict {
            state,
            confidence: 0.8,
            features: FeatureFrame {
                average_ear: ear,
                timestamp_ms: ts,
                ..Default::default()
            },
            timestamp_ms: ts,
        }
    }

    fn smoother() -> TemporalSmoother {
        TemporalSmoother::new(SmoothingConfig::default())
    }

    #[test]
    fn test_short_history_passes_through() {
        let mut s = smoother();
        let raw = verdict(AttentionState::Yawning, 0.3, 1);
        assert_eq!(s.add_and_smooth(raw), raw);
        let raw = verdict(AttentionState::Attentive, 0.3, 2);
        assert_eq!(s.add_and_smooth(raw), raw);
    }

    #[test]
    fn test_single_outlier_is_suppressed() {
        let mut s = smoother();
        for ts in 0..3 {
            s.add_and_smooth(verdict(AttentionState::Attentive, 0.3, ts));
        }
        let out = s.add_and_smooth(verdict(AttentionState::DrowsyFatigued, 0.1, 3));
        assert_eq!(out.state, AttentionState::Attentive);
        assert_eq!(s.stability(), 2);
    }

    #[test]
    fn test_change_requires_dominant_share() {
        let mut s = smoother();
        for ts in 0..5 {
            s.add_and_smooth(verdict(AttentionState::Attentive, 0.3, ts));
        }
        // Drowsy wins the vote before it reaches the hysteresis share.
        let mut switched_at = None;
        for ts in 5..12 {
            let out = s.add_and_smooth(verdict(AttentionState::DrowsyFatigued, 0.1, ts));
            if out.state == AttentionState::DrowsyFatigued {
                switched_at = Some(ts);
                break;
            }
            assert_eq!(out.state, AttentionState::Attentive);
        }
        assert!(switched_at.is_some_and(|ts| ts > 7));
        assert_eq!(s.stability(), 1);
    }

    #[test]
    fn test_full_history_resists_one_differing_frame() {
        let mut s = smoother();
        for ts in 0..7 {
            s.add_and_smooth(verdict(AttentionState::Attentive, 0.3, ts));
        }
        // Drowsy holds weight 0.25 of 1.25, well under the 0.7 share
        let out = s.add_and_smooth(verdict(AttentionState::DrowsyFatigued, 0.1, 7));
        assert_eq!(out.state, AttentionState::Attentive);
        assert_eq!(s.stable_state(), Some(AttentionState::Attentive));
        assert!(s.is_stable());
    }

    #[test]
    fn test_stability_counter_grows_while_state_holds() {
        let mut s = smoother();
        for ts in 0..6 {
            s.add_and_smooth(verdict(AttentionState::Attentive, 0.3, ts));
        }
        assert_eq!(s.stability(), 4);
        assert!(s.is_stable());
    }

    #[test]
    fn test_smoothed_ear_drives_eyes_open() {
        let mut s = smoother();
        s.add_and_smooth(verdict(AttentionState::Attentive, 0.3, 0));
        s.add_and_smooth(verdict(AttentionState::Attentive, 0.3, 1));
        let out = s.add_and_smooth(verdict(AttentionState::Attentive, 0.0, 2));
        // (0.3 * 0.05 + 0.3 * 0.10) / 0.30
        assert!((out.features.average_ear - 0.15).abs() < 1e-9);
        assert!(!out.features.is_eyes_open);
    }

    #[test]
    fn test_confidence_blends_agreement_and_raw() {
        let mut s = smoother();
        s.add_and_smooth(verdict(AttentionState::Attentive, 0.3, 0));
        s.add_and_smooth(verdict(AttentionState::Attentive, 0.3, 1));
        let out = s.add_and_smooth(verdict(AttentionState::Confused, 0.3, 2));
        let expected = 0.7 * (1.0 / 3.0) + 0.3 * 0.8;
        assert!((out.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weights_fall_back_to_latest() {
        let config = SmoothingConfig {
            decay_weights: vec![0.0],
            ..Default::default()
        };
        let mut s = TemporalSmoother::new(config);
        for ts in 0..3 {
            s.add_and_smooth(verdict(AttentionState::Attentive, 0.2 + ts as f64 * 0.01, ts));
        }
        let out = s.add_and_smooth(verdict(AttentionState::Attentive, 0.4, 3));
        assert_eq!(out.features.average_ear, 0.4);
    }

    #[test]
    fn test_reset_matches_fresh_smoother() {
        let mut used = smoother();
        for ts in 0..5 {
            used.add_and_smooth(verdict(AttentionState::Confused, 0.2, ts));
        }
        used.reset();
        let mut fresh = smoother();
        for ts in 0..4 {
            let raw = verdict(AttentionState::Attentive, 0.3, ts);
            assert_eq!(used.add_and_smooth(raw), fresh.add_and_smooth(raw));
        }
        assert_eq!(used.stability(), fresh.stability());
    }
}
