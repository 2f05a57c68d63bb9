//! Capabilities the embedding view supplies to a tracker.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::sensing::ScrollMetrics;

/// Foreground/background signal of the host surface, as a boolean stream.
pub trait VisibilitySignal: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<bool>;
}

impl VisibilitySignal for watch::Sender<bool> {
    fn subscribe(&self) -> watch::Receiver<bool> {
        watch::Sender::subscribe(self)
    }
}

/// For hosts without a visibility concept (e.g. a terminal driver).
#[derive(Debug)]
pub struct AlwaysVisible {
    sender: watch::Sender<bool>,
}

impl AlwaysVisible {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(true);
        Self { sender }
    }
}

impl Default for AlwaysVisible {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilitySignal for AlwaysVisible {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Everything a tracker reads from the view it is mounted in.
#[derive(Clone)]
pub struct HostBindings {
    pub scroll: watch::Receiver<ScrollMetrics>,
    pub visibility: Arc<dyn VisibilitySignal>,
    /// Cancelled by the host on page-hide or unload.
    pub teardown: CancellationToken,
}

impl HostBindings {
    pub fn new(
        scroll: watch::Receiver<ScrollMetrics>,
        visibility: Arc<dyn VisibilitySignal>,
        teardown: CancellationToken,
    ) -> Self {
        Self {
            scroll,
            visibility,
            teardown,
        }
    }
}
