use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::{EngagementState, ReadLogResponse, ReadStatus, SyncLogEntry};
use crate::recovery::{RecoveryAction, SessionRecoveryStore};

use super::{ReadLogClient, SyncError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Regular,
    Termination,
}

/// Builds wire entries from the engagement state and folds server replies
/// back into it.
#[derive(Clone)]
pub struct ProgressReporter {
    client: Arc<dyn ReadLogClient>,
    recovery: SessionRecoveryStore,
    minimum_read: Duration,
}

impl ProgressReporter {
    pub fn new(
        client: Arc<dyn ReadLogClient>,
        recovery: SessionRecoveryStore,
        minimum_read: Duration,
    ) -> Self {
        Self {
            client,
            recovery,
            minimum_read,
        }
    }

    pub fn recovery(&self) -> &SessionRecoveryStore {
        &self.recovery
    }

    pub fn resolve_status(&self, state: &EngagementState, kind: ReportKind) -> ReadStatus {
        match kind {
            ReportKind::Termination => {
                if state.active_time_seconds >= self.minimum_read.as_secs() {
                    ReadStatus::Completed
                } else {
                    ReadStatus::InProgress
                }
            }
            ReportKind::Regular => {
                if state.session_id.is_some() {
                    ReadStatus::InProgress
                } else {
                    ReadStatus::Started
                }
            }
        }
    }

    pub fn build_entry(&self, state: &EngagementState, kind: ReportKind) -> SyncLogEntry {
        SyncLogEntry {
            viewer_id: state.viewer_id,
            content_id: state.content_id,
            status: self.resolve_status(state, kind),
            scroll_depth_pct: state.max_scroll_depth_pct,
            active_time_seconds: state.active_time_seconds,
            session_id: state.session_id.clone(),
        }
    }

    pub async fn send(&self, entry: &SyncLogEntry) -> Result<ReadLogResponse, SyncError> {
        self.client.log_read(entry).await
    }

    /// Applies the outcome of `entry` to `state`. Failures are logged here and
    /// go no further; the returned action tells the caller what to persist.
    pub fn absorb(
        &self,
        state: &mut EngagementState,
        entry: &SyncLogEntry,
        result: Result<ReadLogResponse, SyncError>,
        now: Instant,
    ) -> RecoveryAction {
        if state.terminating {
            log_debug!(
                "ignoring log_read reply for article {} after termination",
                state.content_id
            );
            return RecoveryAction::Keep;
        }

        let response = match result {
            Ok(response) => response,
            Err(SyncError::SessionConflict) => {
                log_warn!(
                    "session {:?} for article {} was rejected; starting fresh on next sync",
                    entry.session_id,
                    state.content_id
                );
                state.clear_session();
                return RecoveryAction::Clear;
            }
            Err(err) => {
                log_warn!(
                    "log_read ({}) for article {} failed: {err}",
                    entry.status.as_str(),
                    state.content_id
                );
                if state.session_id.is_none() {
                    state.awaiting_session = true;
                }
                return RecoveryAction::Keep;
            }
        };

        let session_id = match (response.session_id, entry.session_id.clone()) {
            (Some(session_id), _) => session_id,
            (None, Some(current)) => current,
            (None, None) => {
                log_warn!(
                    "log_read for article {} returned no session id",
                    state.content_id
                );
                state.awaiting_session = true;
                return RecoveryAction::Keep;
            }
        };

        if state.session_id.as_deref() != Some(session_id.as_str()) {
            log_info!(
                "article {} now tracked as session {}",
                state.content_id,
                session_id
            );
        }

        state.adopt_session(session_id.clone());
        state.advance_status(entry.status);
        state.mark_synced(entry.scroll_depth_pct, entry.active_time_seconds, now);
        RecoveryAction::Save(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scripted, ScriptedClient};
    use pretty_assertions::assert_eq;

    fn reporter(client: Arc<ScriptedClient>) -> ProgressReporter {
        ProgressReporter::new(
            client,
            SessionRecoveryStore::in_memory(Duration::from_secs(120)),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn status_resolution() {
        let reporter = reporter(Arc::new(ScriptedClient::new()));
        let mut state = EngagementState::new(42, 7);

        assert_eq!(reporter.resolve_status(&state, ReportKind::Regular), ReadStatus::Started);
        state.adopt_session("abc".into());
        assert_eq!(
            reporter.resolve_status(&state, ReportKind::Regular),
            ReadStatus::InProgress
        );

        state.active_time_seconds = 9;
        assert_eq!(
            reporter.resolve_status(&state, ReportKind::Termination),
            ReadStatus::InProgress
        );
        state.active_time_seconds = 10;
        assert_eq!(
            reporter.resolve_status(&state, ReportKind::Termination),
            ReadStatus::Completed
        );
    }

    #[tokio::test]
    async fn success_adopts_session_and_moves_baselines() {
        let client = Arc::new(ScriptedClient::new());
        let reporter = reporter(client.clone());
        let mut state = EngagementState::new(42, 7);
        state.record_scroll_depth(33.0);
        state.record_active_seconds(4);

        let entry = reporter.build_entry(&state, ReportKind::Regular);
        let result = reporter.send(&entry).await;
        let now = Instant::now();
        let action = reporter.absorb(&mut state, &entry, result, now);

        assert_eq!(action, RecoveryAction::Save("session-1".into()));
        assert_eq!(state.session_id.as_deref(), Some("session-1"));
        assert_eq!(state.status, ReadStatus::Started);
        assert_eq!(state.last_sync_at, Some(now));
        assert_eq!(state.last_synced_scroll_depth, 33.0);
        assert_eq!(state.last_synced_active_time, 4);
    }

    #[tokio::test]
    async fn conflict_clears_the_session() {
        let client = Arc::new(ScriptedClient::new());
        client.push(Scripted::Conflict);
        let reporter = reporter(client.clone());
        let mut state = EngagementState::new(42, 7);
        state.adopt_session("old".into());
        state.advance_status(ReadStatus::InProgress);

        let entry = reporter.build_entry(&state, ReportKind::Regular);
        let result = reporter.send(&entry).await;
        let action = reporter.absorb(&mut state, &entry, result, Instant::now());

        assert_eq!(action, RecoveryAction::Clear);
        assert_eq!(state.session_id, None);
        assert_eq!(state.status, ReadStatus::InProgress);
        assert_eq!(
            reporter.build_entry(&state, ReportKind::Regular).status,
            ReadStatus::Started
        );
    }

    #[tokio::test]
    async fn other_failures_change_nothing() {
        let client = Arc::new(ScriptedClient::new());
        client.push(Scripted::NetworkDown);
        client.push(Scripted::Malformed);
        let reporter = reporter(client.clone());
        let mut state = EngagementState::new(42, 7);
        state.adopt_session("abc".into());

        for _ in 0..2 {
            let entry = reporter.build_entry(&state, ReportKind::Regular);
            let result = reporter.send(&entry).await;
            assert_eq!(
                reporter.absorb(&mut state, &entry, result, Instant::now()),
                RecoveryAction::Keep
            );
        }
        assert_eq!(state.session_id.as_deref(), Some("abc"));
        assert_eq!(state.last_sync_at, None);
    }

    #[tokio::test]
    async fn replies_after_termination_are_ignored() {
        let client = Arc::new(ScriptedClient::new());
        let reporter = reporter(client.clone());
        let mut state = EngagementState::new(42, 7);

        let entry = reporter.build_entry(&state, ReportKind::Regular);
        let result = reporter.send(&entry).await;
        state.terminating = true;

        assert_eq!(
            reporter.absorb(&mut state, &entry, result, Instant::now()),
            RecoveryAction::Keep
        );
        assert_eq!(state.session_id, None);
    }
}
