use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::models::EngagementState;
use crate::settings::TrackerConfig;

/// Scroll geometry of the viewed document, as reported by the host each frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f64, scroll_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_top,
            scroll_height,
            viewport_height,
        }
    }

    /// Percentage of the scrollable height reached, rounded to two decimals.
    /// A document that fits in the viewport counts as fully read.
    pub fn depth_pct(&self) -> f64 {
        let scrollable = self.scroll_height - self.viewport_height;
        if scrollable.is_nan() || scrollable <= 0.0 {
            return 100.0;
        }

        let raw = self.scroll_top / scrollable * 100.0;
        if !raw.is_finite() {
            return 0.0;
        }
        let clamped = raw.clamp(0.0, 100.0);
        (clamped * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSample {
    pub depth_pct: f64,
    pub advanced: bool,
    pub wants_sync: bool,
}

#[derive(Debug, Clone)]
pub struct ScrollDepthSampler {
    sync_delta_pct: f64,
    sync_min_interval: Duration,
}

impl ScrollDepthSampler {
    pub fn new(sync_delta_pct: f64, sync_min_interval: Duration) -> Self {
        Self {
            sync_delta_pct,
            sync_min_interval,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.scroll_sync_delta_pct, config.scroll_sync_min_interval())
    }

    pub fn sync_min_interval(&self) -> Duration {
        self.sync_min_interval
    }

    /// Folds one frame's geometry into `state` and reports whether the
    /// progress since the last sync is worth a scroll-triggered sync.
    pub fn sample(
        &self,
        state: &mut EngagementState,
        metrics: &ScrollMetrics,
        now: Instant,
    ) -> ScrollSample {
        let depth_pct = metrics.depth_pct();
        if state.terminating {
            return ScrollSample {
                depth_pct,
                advanced: false,
                wants_sync: false,
            };
        }

        let advanced = state.record_scroll_depth(depth_pct);
        let wants_sync = state.session_id.is_some()
            && state.scroll_progress_since_sync() >= self.sync_delta_pct
            && state
                .since_last_sync(now)
                .map(|elapsed| elapsed >= self.sync_min_interval)
                .unwrap_or(true);

        ScrollSample {
            depth_pct,
            advanced,
            wants_sync,
        }
    }
}
