//! Per-view engagement state.
//!
//! One `EngagementState` exists per mounted view. The sampling loops advance
//! scroll depth and active time; the reporter owns the session id and the
//! synced baselines.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Externally observed reading status. Ordering follows the lifecycle, so
/// `max` never moves a status backwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    NotStarted,
    Started,
    InProgress,
    Completed,
}

impl Default for ReadStatus {
    fn default() -> Self {
        ReadStatus::NotStarted
    }
}

impl ReadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStatus::NotStarted => "not_started",
            ReadStatus::Started => "started",
            ReadStatus::InProgress => "in_progress",
            ReadStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadStatus::Completed)
    }
}

#[derive(Debug, Clone)]
pub struct EngagementState {
    pub content_id: u64,
    pub viewer_id: u64,
    pub session_id: Option<String>,
    pub max_scroll_depth_pct: f64,
    pub active_time_seconds: u64,
    pub status: ReadStatus,
    /// Set once by the termination path; every sampler and trigger checks it.
    pub terminating: bool,
    /// A sync must mint a new session: the start sync failed or the server
    /// rejected the previous session.
    pub awaiting_session: bool,
    pub last_sync_at: Option<Instant>,
    pub last_synced_scroll_depth: f64,
    pub last_synced_active_time: u64,
}

impl EngagementState {
    pub fn new(content_id: u64, viewer_id: u64) -> Self {
        Self {
            content_id,
            viewer_id,
            session_id: None,
            max_scroll_depth_pct: 0.0,
            active_time_seconds: 0,
            status: ReadStatus::NotStarted,
            terminating: false,
            awaiting_session: false,
            last_sync_at: None,
            last_synced_scroll_depth: 0.0,
            last_synced_active_time: 0,
        }
    }

    /// Raises the max scroll depth. Returns `true` only if it moved.
    pub fn record_scroll_depth(&mut self, depth_pct: f64) -> bool {
        if self.terminating || !depth_pct.is_finite() || depth_pct <= self.max_scroll_depth_pct {
            return false;
        }
        self.max_scroll_depth_pct = depth_pct.min(100.0);
        true
    }

    pub fn record_active_seconds(&mut self, seconds: u64) -> bool {
        if self.terminating || seconds <= self.active_time_seconds {
            return false;
        }
        self.active_time_seconds = seconds;
        true
    }

    /// Moves the status forward; `completed` is never left.
    pub fn advance_status(&mut self, status: ReadStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = self.status.max(status);
    }

    pub fn scroll_progress_since_sync(&self) -> f64 {
        self.max_scroll_depth_pct - self.last_synced_scroll_depth
    }

    pub fn since_last_sync(&self, now: Instant) -> Option<std::time::Duration> {
        self.last_sync_at
            .map(|at| now.saturating_duration_since(at))
    }

    pub fn adopt_session(&mut self, session_id: String) {
        self.session_id = Some(session_id);
        self.awaiting_session = false;
    }

    pub fn clear_session(&mut self) {
        self.session_id = None;
        self.awaiting_session = true;
    }

    pub fn mark_synced(&mut self, scroll_depth_pct: f64, active_time_seconds: u64, now: Instant) {
        self.last_sync_at = Some(now);
        self.last_synced_scroll_depth = scroll_depth_pct;
        self.last_synced_active_time = active_time_seconds;
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            scroll_depth_pct: self.max_scroll_depth_pct,
            active_time_seconds: self.active_time_seconds,
            status: self.status,
        }
    }
}

/// Read-only progress view handed to the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub scroll_depth_pct: f64,
    pub active_time_seconds: u64,
    pub status: ReadStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scroll_depth_never_decreases() {
        let mut state = EngagementState::new(42, 7);
        let mut observed = Vec::new();
        for depth in [10.0, 35.5, 20.0, 35.5, 80.25, 0.0, f64::NAN, 79.0] {
            state.record_scroll_depth(depth);
            observed.push(state.max_scroll_depth_pct);
        }
        assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(state.max_scroll_depth_pct, 80.25);
    }

    #[test]
    fn nothing_moves_once_terminating() {
        let mut state = EngagementState::new(42, 7);
        state.record_scroll_depth(30.0);
        state.record_active_seconds(12);
        state.terminating = true;

        assert!(!state.record_scroll_depth(90.0));
        assert!(!state.record_active_seconds(20));
        assert_eq!(state.snapshot().scroll_depth_pct, 30.0);
        assert_eq!(state.snapshot().active_time_seconds, 12);
    }

    #[test]
    fn status_only_moves_forward() {
        let mut state = EngagementState::new(1, 1);
        state.advance_status(ReadStatus::InProgress);
        state.advance_status(ReadStatus::Started);
        assert_eq!(state.status, ReadStatus::InProgress);

        state.advance_status(ReadStatus::Completed);
        state.advance_status(ReadStatus::InProgress);
        assert_eq!(state.status, ReadStatus::Completed);
    }

    #[test]
    fn clearing_a_session_flags_a_fresh_one() {
        let mut state = EngagementState::new(1, 1);
        state.adopt_session("abc".into());
        assert!(!state.awaiting_session);

        state.clear_session();
        assert_eq!(state.session_id, None);
        assert!(state.awaiting_session);
    }
}
