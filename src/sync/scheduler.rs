use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::EngagementState;
use crate::settings::TrackerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The forced `started` sync shortly after mount.
    Start,
    Periodic,
    ScrollThreshold,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Start => "start",
            SyncTrigger::Periodic => "periodic",
            SyncTrigger::ScrollThreshold => "scroll",
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, SyncTrigger::Start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Terminating,
    InFlight,
    NoSession,
    TooSoon,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::Terminating => "tracker is terminating",
            SkipReason::InFlight => "another sync is in flight",
            SkipReason::NoSession => "no session to sync",
            SkipReason::TooSoon => "too soon after the previous sync",
        };
        f.write_str(reason)
    }
}

/// Held for the duration of one sync; releases the single-flight slot on drop.
#[derive(Debug)]
pub struct FlightGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Decides whether a trigger may start a sync. Rejected triggers are dropped,
/// never queued. Spacing is measured from the last successful sync.
#[derive(Debug)]
pub struct SyncScheduler {
    in_flight: Arc<AtomicBool>,
    min_spacing: Duration,
}

impl SyncScheduler {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
            min_spacing,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.min_sync_spacing())
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn try_begin(
        &self,
        trigger: SyncTrigger,
        state: &EngagementState,
        now: Instant,
    ) -> Result<FlightGuard, SkipReason> {
        if state.terminating {
            return Err(SkipReason::Terminating);
        }

        match trigger {
            SyncTrigger::Start => {}
            SyncTrigger::Periodic => {
                if state.session_id.is_none() && !state.awaiting_session {
                    return Err(SkipReason::NoSession);
                }
            }
            SyncTrigger::ScrollThreshold => {
                if state.session_id.is_none() {
                    return Err(SkipReason::NoSession);
                }
            }
        }

        if !trigger.is_forced() {
            let too_soon = state
                .since_last_sync(now)
                .map(|elapsed| elapsed < self.min_spacing)
                .unwrap_or(false);
            if too_soon {
                return Err(SkipReason::TooSoon);
            }
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SkipReason::InFlight);
        }

        Ok(FlightGuard {
            in_flight: self.in_flight.clone(),
        })
    }
}
