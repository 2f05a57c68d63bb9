use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::host::HostBindings;
use crate::models::ProgressSnapshot;
use crate::recovery::{RecoveryAction, SessionRecoveryStore};
use crate::sensing::{ScrollDepthSampler, SensingContext, SensingController};
use crate::settings::TrackerConfig;
use crate::sync::{
    DurableDelivery, ProgressReporter, ReadLogClient, ReportKind, SyncScheduler, SyncTrigger,
};

use super::state::{lock_state, TrackerState};
use super::termination::{FinalFlush, TerminationGuard};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// What the content view knows about itself at mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewContext {
    pub content_id: u64,
    /// `None` for anonymous viewers, who are not tracked.
    pub viewer_id: Option<u64>,
}

/// Backend-facing collaborators, shared by every tracker of a process.
#[derive(Clone)]
pub struct TrackerServices {
    pub client: Arc<dyn ReadLogClient>,
    pub delivery: Arc<dyn DurableDelivery>,
    pub recovery: SessionRecoveryStore,
}

struct TrackerCore {
    view_id: Uuid,
    content_id: u64,
    config: TrackerConfig,
    state: Arc<Mutex<TrackerState>>,
    scheduler: Arc<SyncScheduler>,
    reporter: ProgressReporter,
    guard: TerminationGuard,
    progress: Arc<watch::Sender<ProgressSnapshot>>,
    cancel: CancellationToken,
}

impl TrackerCore {
    fn spawn_sync(self: &Arc<Self>, trigger: SyncTrigger) {
        let core = Arc::clone(self);
        tokio::spawn(async move {
            core.request_sync(trigger).await;
        });
    }

    /// Runs one sync if the scheduler admits `trigger`. Returns whether a
    /// request was sent; rejected triggers are dropped.
    async fn request_sync(&self, trigger: SyncTrigger) -> bool {
        let (flight, entry) = {
            let state = lock_state(&self.state);
            match self
                .scheduler
                .try_begin(trigger, &state.engagement, Instant::now())
            {
                Ok(flight) => (
                    flight,
                    self.reporter.build_entry(&state.engagement, ReportKind::Regular),
                ),
                Err(reason) => {
                    log_debug!(
                        "{} sync for article {} dropped: {}",
                        trigger.as_str(),
                        self.content_id,
                        reason
                    );
                    return false;
                }
            }
        };

        let result = self.reporter.send(&entry).await;

        let (action, snapshot) = {
            let mut state = lock_state(&self.state);
            let action =
                self.reporter
                    .absorb(&mut state.engagement, &entry, result, Instant::now());
            (action, state.engagement.snapshot())
        };
        self.progress.send_replace(snapshot);

        let saved = matches!(action, RecoveryAction::Save(_));
        self.reporter.recovery().apply(self.content_id, action).await;
        if saved && self.guard.final_flush_delivered() {
            // the final flush purged the record while we were saving it
            self.reporter.recovery().clear(self.content_id).await;
        }

        drop(flight);
        true
    }

    /// Synchronous half of termination: freeze, deliver, stop every loop.
    fn terminate_now(&self, reason: &str) -> Option<FinalFlush> {
        let (flush, snapshot) = {
            let mut state = lock_state(&self.state);
            let flush = self
                .guard
                .fire(&mut state.engagement, &self.reporter, reason)?;
            (flush, state.engagement.snapshot())
        };

        self.cancel.cancel();
        self.progress.send_replace(snapshot);
        Some(flush)
    }

    async fn terminate(&self, reason: &str) {
        if let Some(flush) = self.terminate_now(reason) {
            if flush.delivered {
                self.reporter.recovery().clear(self.content_id).await;
            }
        }
    }
}

async fn sync_loop(
    core: Arc<TrackerCore>,
    mounted_at: Instant,
    mut triggers: mpsc::Receiver<SyncTrigger>,
) {
    let start = time::sleep_until(mounted_at + core.config.start_delay());
    tokio::pin!(start);
    let mut started = false;

    let period = core.config.periodic_interval();
    let mut periodic = time::interval_at(mounted_at + period, period);
    periodic.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = core.cancel.cancelled() => break,
            _ = &mut start, if !started => {
                started = true;
                core.spawn_sync(SyncTrigger::Start);
            }
            _ = periodic.tick() => core.spawn_sync(SyncTrigger::Periodic),
            Some(trigger) = triggers.recv() => core.spawn_sync(trigger),
        }
    }

    log_debug!("sync loop for view {} finished", core.view_id);
}

async fn teardown_watch(core: Arc<TrackerCore>, teardown: CancellationToken) {
    tokio::select! {
        _ = teardown.cancelled() => core.terminate("page hidden").await,
        _ = core.cancel.cancelled() => {}
    }
}

/// Tracking for one mounted view. Created on view-enter, disposed with
/// [`TrackerInstance::unmount`]; dropping it without unmounting still sends
/// the final report.
pub struct TrackerInstance {
    core: Arc<TrackerCore>,
    sensing: SensingController,
    tasks: Vec<JoinHandle<()>>,
}

impl TrackerInstance {
    /// Starts tracking, or returns `None` for anonymous viewers.
    pub async fn mount(
        view: ViewContext,
        host: HostBindings,
        services: TrackerServices,
        config: &TrackerConfig,
    ) -> Option<Self> {
        let content_id = view.content_id;
        let Some(viewer_id) = view.viewer_id else {
            log_info!("article {} viewed anonymously; not tracking", content_id);
            return None;
        };

        let mounted_at = Instant::now();
        let mut state = TrackerState::new(content_id, viewer_id, mounted_at, config.max_tick_gap());
        if let Some(session_id) = services.recovery.get(content_id).await {
            log_info!("resuming session {} for article {}", session_id, content_id);
            state.engagement.adopt_session(session_id);
        }

        let (progress_tx, _) = watch::channel(state.engagement.snapshot());
        let progress = Arc::new(progress_tx);
        let state = Arc::new(Mutex::new(state));
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let scheduler = Arc::new(SyncScheduler::from_config(config));

        let core = Arc::new(TrackerCore {
            view_id: Uuid::new_v4(),
            content_id,
            config: config.clone(),
            state: state.clone(),
            scheduler: scheduler.clone(),
            reporter: ProgressReporter::new(
                services.client,
                services.recovery,
                config.minimum_read(),
            ),
            guard: TerminationGuard::new(services.delivery),
            progress: progress.clone(),
            cancel: cancel.clone(),
        });

        let ctx = SensingContext {
            content_id,
            state,
            sampler: ScrollDepthSampler::from_config(config),
            scroll: host.scroll,
            visibility: host.visibility.subscribe(),
            progress,
            scheduler,
            triggers: trigger_tx,
            frame_interval: config.frame_interval(),
            activity_tick: config.activity_tick(),
        };

        let mut sensing = SensingController::new();
        if let Err(err) = sensing.start_sensing(ctx, &cancel) {
            log_error!("sampling for article {} did not start: {err:#}", content_id);
        }

        let tasks = vec![
            tokio::spawn(sync_loop(core.clone(), mounted_at, trigger_rx)),
            tokio::spawn(teardown_watch(core.clone(), host.teardown)),
        ];

        log_info!(
            "tracking article {} for viewer {} (view {})",
            content_id,
            viewer_id,
            core.view_id
        );

        Some(Self {
            core,
            sensing,
            tasks,
        })
    }

    pub fn view_id(&self) -> Uuid {
        self.core.view_id
    }

    pub fn content_id(&self) -> u64 {
        self.core.content_id
    }

    /// Read-only progress stream for passive UI.
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.core.progress.subscribe()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        lock_state(&self.core.state).engagement.snapshot()
    }

    pub fn session_id(&self) -> Option<String> {
        lock_state(&self.core.state).engagement.session_id.clone()
    }

    pub fn is_terminating(&self) -> bool {
        lock_state(&self.core.state).is_terminating()
    }

    /// Pointer, keyboard or touch input from the host.
    pub fn record_input(&self) {
        let mut state = lock_state(&self.core.state);
        if !state.is_terminating() {
            state.activity.touch(Instant::now());
        }
    }

    /// Page-hide or unload observed directly by the caller.
    pub async fn page_hide(&self) {
        self.core.terminate("page hidden").await;
    }

    pub async fn unmount(mut self) {
        self.core.terminate("unmounted").await;
        self.core.cancel.cancel();

        if let Err(err) = self.sensing.stop_sensing().await {
            log_error!("article {}: {err:#}", self.core.content_id);
        }
        for handle in self.tasks.drain(..) {
            let _ = handle.await;
        }

        log_info!("view {} disposed", self.core.view_id);
    }

    #[cfg(test)]
    pub(crate) async fn request_sync(&self, trigger: SyncTrigger) -> bool {
        self.core.request_sync(trigger).await
    }

    #[cfg(test)]
    pub(crate) fn engagement(&self) -> crate::models::EngagementState {
        lock_state(&self.core.state).engagement.clone()
    }
}

impl Drop for TrackerInstance {
    fn drop(&mut self) {
        if let Some(flush) = self.core.terminate_now("dropped") {
            if flush.delivered {
                let recovery = self.core.reporter.recovery().clone();
                let content_id = self.core.content_id;
                if let Ok(handle) = Handle::try_current() {
                    handle.spawn(async move { recovery.clear(content_id).await });
                }
            }
        }

        self.core.cancel.cancel();
        self.sensing.cancel();
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
    }
}
