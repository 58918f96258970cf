//! Frame admission and UI update gating.
//!
//! The governor decides which camera frames are worth running through the
//! pipeline and which results are worth showing. Timestamps are supplied by
//! the caller in milliseconds so behavior is reproducible in tests.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GovernorConfig;
use crate::ring::RingHistory;
use crate::types::{AttentionState, EngagementReport};

struct CachedStatus {
    text: String,
    cached_at_ms: u64,
}

/// Shared handle to the last emitted status line.
///
/// Cloning is cheap; every clone sees the same cache, so a UI thread can
/// poll it while frames are processed elsewhere.
#[derive(Clone)]
pub struct StatusCache {
    inner: Arc<RwLock<Option<CachedStatus>>>,
    validity_ms: u64,
}

impl StatusCache {
    pub fn new(validity_ms: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            validity_ms,
        }
    }

    /// Cached text if it is still within the validity window at `now_ms`.
    pub fn get(&self, now_ms: u64) -> Option<String> {
        let cache = self.inner.read();
        cache
            .as_ref()
            .filter(|cached| now_ms.saturating_sub(cached.cached_at_ms) <= self.validity_ms)
            .map(|cached| cached.text.clone())
    }

    /// Whether a cached text exists and is still within the validity window.
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        self.inner
            .read()
            .as_ref()
            .is_some_and(|cached| now_ms.saturating_sub(cached.cached_at_ms) <= self.validity_ms)
    }

    /// Most recent text regardless of age.
    pub fn latest(&self) -> Option<String> {
        self.inner.read().as_ref().map(|cached| cached.text.clone())
    }

    pub fn store(&self, text: &str, now_ms: u64) {
        let mut cache = self.inner.write();
        match cache.as_mut() {
            Some(cached) => {
                cached.text.clear();
                cached.text.push_str(text);
                cached.cached_at_ms = now_ms;
            }
            None => {
                *cache = Some(CachedStatus {
                    text: text.to_string(),
                    cached_at_ms: now_ms,
                });
            }
        }
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

/// What the presentation layer should receive for a processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiDecision {
    /// Deliver the new report and refresh the status text.
    Emit,
    /// Not due for an update; re-serve the cached text, which is still valid.
    ServeCached,
    /// Not due for an update and the cached text has expired.
    Suppress,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_frames: u64,
    pub skipped_frames: u64,
    pub processed_frames: u64,
    pub ui_updates: u64,
    pub target_fps: f64,
    /// Admitted frames per second over the interval window
    pub actual_fps: f64,
    pub average_processing_ms: f64,
    /// Skipped frames as a percentage of all frames, 0 to 100
    pub frame_skip_percentage: f64,
    pub overloaded: bool,
}

pub struct FrameGovernor {
    config: GovernorConfig,
    min_interval_ms: f64,
    intervals: RingHistory<f64>,
    processing_times: RingHistory<f64>,
    last_admitted_ms: Option<u64>,
    consecutive_shed: u32,
    last_ui_ms: Option<u64>,
    last_ui_state: Option<AttentionState>,
    last_ui_engagement: f64,
    total_frames: u64,
    skipped_frames: u64,
    processed_frames: u64,
    ui_updates: u64,
    status: StatusCache,
}

impl FrameGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            min_interval_ms: config.min_interval_ms(),
            intervals: RingHistory::new(config.window_size),
            processing_times: RingHistory::new(config.window_size),
            last_admitted_ms: None,
            consecutive_shed: 0,
            last_ui_ms: None,
            last_ui_state: None,
            last_ui_engagement: 0.0,
            total_frames: 0,
            skipped_frames: 0,
            processed_frames: 0,
            ui_updates: 0,
            status: StatusCache::new(config.cache_validity_ms),
            config,
        }
    }

    /// Decides whether the frame arriving at `now_ms` should be processed.
    pub fn admit(&mut self, now_ms: u64) -> bool {
        self.total_frames += 1;

        if let Some(last) = self.last_admitted_ms {
            let elapsed = now_ms.saturating_sub(last) as f64;
            if elapsed < self.min_interval_ms {
                self.skipped_frames += 1;
                return false;
            }
            self.intervals.push(elapsed);
        }
        self.last_admitted_ms = Some(now_ms);

        // Shedding still advances the clock above, so the next admissible
        // frame is measured from this one.
        if self.is_overloaded() && self.consecutive_shed + 1 < self.config.skip_frame_threshold {
            self.consecutive_shed += 1;
            self.skipped_frames += 1;
            debug!(
                shed = self.consecutive_shed,
                avg_ms = self.average_processing_ms(),
                "Shedding frame under load"
            );
            return false;
        }

        self.consecutive_shed = 0;
        self.processed_frames += 1;
        true
    }

    pub fn record_processing_time(&mut self, elapsed_ms: f64) {
        if elapsed_ms.is_finite() && elapsed_ms >= 0.0 {
            self.processing_times.push(elapsed_ms);
        }
    }

    fn average_processing_ms(&self) -> f64 {
        mean(&self.processing_times)
    }

    pub fn is_overloaded(&self) -> bool {
        !self.processing_times.is_empty()
            && self.average_processing_ms() > self.config.overload_ratio * self.min_interval_ms
    }

    /// UI gating for a freshly produced report.
    ///
    /// Emitting requires both the update interval to have elapsed and a
    /// significant change: a new attention state or an engagement move
    /// beyond the configured delta. Any other frame falls back to the
    /// cached text while it is fresh.
    pub fn ui_decision(&mut self, report: &EngagementReport, now_ms: u64) -> UiDecision {
        let timer_elapsed = self
            .last_ui_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.config.ui_update_interval_ms);
        let state_changed = self.last_ui_state != Some(report.attention.state);
        let engagement_moved =
            (report.overall_engagement - self.last_ui_engagement).abs() > self.config.engagement_delta;

        if !(timer_elapsed && (state_changed || engagement_moved)) {
            return if self.status.is_fresh(now_ms) {
                UiDecision::ServeCached
            } else {
                UiDecision::Suppress
            };
        }

        self.last_ui_ms = Some(now_ms);
        self.last_ui_state = Some(report.attention.state);
        self.last_ui_engagement = report.overall_engagement;
        self.ui_updates += 1;
        UiDecision::Emit
    }

    pub fn status_cache(&self) -> &StatusCache {
        &self.status
    }

    pub fn stats(&self) -> PerformanceStats {
        let avg_interval = mean(&self.intervals);
        PerformanceStats {
            total_frames: self.total_frames,
            skipped_frames: self.skipped_frames,
            processed_frames: self.processed_frames,
            ui_updates: self.ui_updates,
            target_fps: self.config.target_fps,
            actual_fps: if avg_interval > 0.0 { 1000.0 / avg_interval } else { 0.0 },
            average_processing_ms: self.average_processing_ms(),
            frame_skip_percentage: if self.total_frames > 0 {
                100.0 * self.skipped_frames as f64 / self.total_frames as f64
            } else {
                0.0
            },
            overloaded: self.is_overloaded(),
        }
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
        self.processing_times.clear();
        self.last_admitted_ms = None;
        self.consecutive_shed = 0;
        self.last_ui_ms = None;
        self.last_ui_state = None;
        self.last_ui_engagement = 0.0;
        self.total_frames = 0;
        self.skipped_frames = 0;
        self.processed_frames = 0;
        self.ui_updates = 0;
        self.status.clear();
    }
}

fn mean(values: &RingHistory<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
