use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::{EngagementState, ReadStatus, SyncLogEntry};
use crate::sync::{DurableDelivery, ProgressReporter, ReportKind};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FinalFlush {
    pub entry: SyncLogEntry,
    pub delivered: bool,
}

/// Fires the final report exactly once, however many teardown signals arrive.
/// Bypasses the scheduler: no single-flight or spacing rules apply.
pub struct TerminationGuard {
    fired: AtomicBool,
    delivered: AtomicBool,
    delivery: Arc<dyn DurableDelivery>,
}

impl TerminationGuard {
    pub fn new(delivery: Arc<dyn DurableDelivery>) -> Self {
        Self {
            fired: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
            delivery,
        }
    }

    /// Whether the final entry was handed to the durable channel.
    pub fn final_flush_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    /// Freezes `state` and hands the final entry to the durable channel.
    /// Returns `None` on every call after the first.
    pub fn fire(
        &self,
        state: &mut EngagementState,
        reporter: &ProgressReporter,
        reason: &str,
    ) -> Option<FinalFlush> {
        if self.fired.swap(true, Ordering::AcqRel) {
            return None;
        }

        state.terminating = true;
        let entry = reporter.build_entry(state, ReportKind::Termination);

        if entry.session_id.is_none() {
            log_warn!(
                "final report for article {} skipped ({reason}): no session",
                entry.content_id
            );
            return Some(FinalFlush {
                entry,
                delivered: false,
            });
        }

        let delivered = self.delivery.deliver(entry.clone());
        self.delivered.store(delivered, Ordering::Release);

        if delivered {
            log_info!(
                "final report for article {} queued ({reason}): {} at {:.2}% after {}s",
                entry.content_id,
                entry.status.as_str(),
                entry.scroll_depth_pct,
                entry.active_time_seconds
            );
            if entry.status == ReadStatus::Completed {
                state.advance_status(ReadStatus::Completed);
            }
        } else {
            log_warn!(
                "final report for article {} could not be queued ({reason})",
                entry.content_id
            );
        }

        Some(FinalFlush { entry, delivered })
    }
}
