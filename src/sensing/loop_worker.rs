use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::ProgressSnapshot;
use crate::sync::{SyncScheduler, SyncTrigger};
use crate::tracker::state::{lock_state, TrackerState};

use super::scroll::{ScrollDepthSampler, ScrollMetrics};

// Per-frame output is far too chatty for the default level.
const ENABLE_LOGS: bool = false;

use crate::log_debug;

/// Shared handles for both sampling loops of one view.
#[derive(Clone)]
pub struct SensingContext {
    pub content_id: u64,
    pub state: Arc<Mutex<TrackerState>>,
    pub sampler: ScrollDepthSampler,
    pub scroll: watch::Receiver<ScrollMetrics>,
    pub visibility: watch::Receiver<bool>,
    pub progress: Arc<watch::Sender<ProgressSnapshot>>,
    pub scheduler: Arc<SyncScheduler>,
    pub triggers: mpsc::Sender<SyncTrigger>,
    pub frame_interval: Duration,
    pub activity_tick: Duration,
}

/// Samples scroll geometry once per frame until cancelled or terminating.
///
/// A scroll-threshold trigger is raised at most once per
/// `scroll_sync_min_interval`, and never while a sync is in flight, so an
/// unreachable backend is not retried every frame.
pub async fn frame_loop(ctx: SensingContext, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_requested: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let metrics = *ctx.scroll.borrow();
                let now = Instant::now();
                let (sample, snapshot) = {
                    let mut state = lock_state(&ctx.state);
                    if state.is_terminating() {
                        break;
                    }
                    let sample = ctx.sampler.sample(&mut state.engagement, &metrics, now);
                    (sample, state.engagement.snapshot())
                };

                if sample.advanced {
                    log_debug!("article {} scroll depth {:.2}%", ctx.content_id, snapshot.scroll_depth_pct);
                    ctx.progress.send_replace(snapshot);
                }

                let due = last_requested
                    .map(|at| now.saturating_duration_since(at) >= ctx.sampler.sync_min_interval())
                    .unwrap_or(true);
                if sample.wants_sync && due && !ctx.scheduler.is_in_flight() {
                    // a full channel means a trigger is already pending
                    if ctx.triggers.try_send(SyncTrigger::ScrollThreshold).is_ok() {
                        last_requested = Some(now);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_debug!("frame loop for article {} shutting down", ctx.content_id);
                break;
            }
        }
    }
}

/// Credits foreground time once per tick and tracks visibility flips.
pub async fn activity_loop(mut ctx: SensingContext, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + ctx.activity_tick, ctx.activity_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut visibility_open = true;

    loop {
        // A flip landing on a tick instant must reset the clock before that
        // tick credits anything.
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_debug!("activity loop for article {} shutting down", ctx.content_id);
                break;
            }
            changed = ctx.visibility.changed(), if visibility_open => {
                if changed.is_err() {
                    visibility_open = false;
                    continue;
                }
                let visible = *ctx.visibility.borrow_and_update();
                let mut state = lock_state(&ctx.state);
                if state.is_terminating() {
                    break;
                }
                state.activity.on_visibility_change(visible, Instant::now());
                log_debug!("article {} visibility -> {}", ctx.content_id, visible);
            }
            _ = ticker.tick() => {
                let visible = *ctx.visibility.borrow();
                let snapshot = {
                    let mut state = lock_state(&ctx.state);
                    if state.is_terminating() {
                        break;
                    }
                    state.activity.tick(Instant::now(), visible);
                    state
                        .sync_active_from_accumulator()
                        .then(|| state.engagement.snapshot())
                };

                if let Some(snapshot) = snapshot {
                    ctx.progress.send_replace(snapshot);
                }
            }
        }
    }
}
