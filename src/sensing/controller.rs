use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{activity_loop, frame_loop, SensingContext};

/// Owns the frame and activity loops of one view under a single disposal token.
pub struct SensingController {
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SensingController {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// Cancelling `parent` stops the loops as well as `stop_sensing` does.
    pub fn start_sensing(&mut self, ctx: SensingContext, parent: &CancellationToken) -> Result<()> {
        if self.is_active() {
            bail!("sensing already active");
        }

        let cancel_token = parent.child_token();
        info!("Starting scroll and activity sampling for article {}", ctx.content_id);

        self.handles.push(tokio::spawn(frame_loop(ctx.clone(), cancel_token.clone())));
        self.handles.push(tokio::spawn(activity_loop(ctx, cancel_token.clone())));
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop_sensing(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        for handle in self.handles.drain(..) {
            handle
                .await
                .context("sampling loop task failed to join")?;
        }
        Ok(())
    }

    /// Synchronous teardown for drop paths; the loops exit on their next poll.
    pub fn cancel(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.handles.clear();
    }
}

impl Default for SensingController {
    fn default() -> Self {
        Self::new()
    }
}
