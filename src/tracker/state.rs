use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::models::EngagementState;
use crate::sensing::ActiveTimeAccumulator;

/// Everything the sampling loops and the reporter mutate for one view.
#[derive(Debug, Clone)]
pub struct TrackerState {
    pub engagement: EngagementState,
    pub activity: ActiveTimeAccumulator,
}

impl TrackerState {
    pub fn new(content_id: u64, viewer_id: u64, now: Instant, max_tick_gap: Duration) -> Self {
        Self {
            engagement: EngagementState::new(content_id, viewer_id),
            activity: ActiveTimeAccumulator::new(now, max_tick_gap),
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.engagement.terminating
    }

    /// Copies the accumulator's whole seconds into the engagement state.
    /// Returns `true` if the visible value changed.
    pub fn sync_active_from_accumulator(&mut self) -> bool {
        let seconds = self.activity.active_seconds();
        self.engagement.record_active_seconds(seconds)
    }
}

/// Critical sections never await and never leave the state half-updated,
/// so a poisoned lock is recovered rather than propagated.
pub fn lock_state(state: &Mutex<TrackerState>) -> MutexGuard<'_, TrackerState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
