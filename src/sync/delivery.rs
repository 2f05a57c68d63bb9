use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{runtime::Handle, task::JoinHandle};

use crate::models::SyncLogEntry;
use crate::settings::TrackerConfig;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Fire-and-forget transmission that must survive the tracker being torn
/// down. Implementations never wait for, or read, a response.
pub trait DurableDelivery: Send + Sync {
    /// Returns `false` when the entry could not even be queued.
    fn deliver(&self, entry: SyncLogEntry) -> bool;
}

/// Beacon-style delivery: each entry is posted from a task detached from the
/// tracker, on the runtime captured at construction.
#[derive(Clone)]
pub struct BeaconDelivery {
    client: reqwest::Client,
    url: String,
    runtime: Handle,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BeaconDelivery {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("failed to build HTTP client for beacon delivery")?;
        let runtime = Handle::try_current().context("beacon delivery needs a tokio runtime")?;
        Ok(Self::with_client(client, config.log_read_url(), runtime))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>, runtime: Handle) -> Self {
        Self {
            client,
            url: url.into(),
            runtime,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Waits at most `timeout` for queued beacons and returns how many were
    /// still unfinished at the deadline. For hosts that are about to exit and
    /// cannot otherwise keep the sends alive.
    pub async fn flush(&self, timeout: Duration) -> usize {
        let mut handles = {
            let mut guard = self.lock_pending();
            std::mem::take(&mut *guard)
        };

        let drained = tokio::time::timeout(timeout, async {
            for handle in handles.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;

        handles.retain(|handle| !handle.is_finished());
        let unfinished = handles.len();
        if drained.is_err() {
            log_warn!(
                "beacon flush gave up after {}ms with {} send(s) outstanding",
                timeout.as_millis(),
                unfinished
            );
        }

        self.lock_pending().extend(handles);
        unfinished
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl DurableDelivery for BeaconDelivery {
    fn deliver(&self, entry: SyncLogEntry) -> bool {
        let client = self.client.clone();
        let url = self.url.clone();

        let handle = self.runtime.spawn(async move {
            let content_id = entry.content_id;
            match client.post(&url).json(&entry).send().await {
                Ok(response) => log_info!(
                    "beacon for article {} sent ({})",
                    content_id,
                    response.status()
                ),
                Err(err) => log_warn!("beacon for article {} failed: {err}", content_id),
            }
        });

        let mut guard = self.lock_pending();
        guard.retain(|pending| !pending.is_finished());
        guard.push(handle);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReadStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn delivers_without_the_caller_waiting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/log_read"))
            .and(body_json(json!({
                "viewer_id": 7,
                "article_id": 42,
                "status": "completed",
                "scroll_depth": 95.0,
                "active_time_seconds": 38,
                "session_id": "abc123",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let delivery = BeaconDelivery::with_client(
            reqwest::Client::new(),
            format!("{}/log_read", server.uri()),
            Handle::current(),
        );
        let queued = delivery.deliver(SyncLogEntry {
            viewer_id: 7,
            content_id: 42,
            status: ReadStatus::Completed,
            scroll_depth_pct: 95.0,
            active_time_seconds: 38,
            session_id: Some("abc123".into()),
        });
        assert!(queued);

        assert_eq!(delivery.flush(Duration::from_secs(5)).await, 0);
        assert_eq!(delivery.pending_count(), 0);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn flush_reports_sends_still_outstanding_at_the_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let delivery = BeaconDelivery::with_client(
            reqwest::Client::new(),
            format!("{}/log_read", server.uri()),
            Handle::current(),
        );
        delivery.deliver(SyncLogEntry {
            viewer_id: 7,
            content_id: 42,
            status: ReadStatus::InProgress,
            scroll_depth_pct: 12.0,
            active_time_seconds: 3,
            session_id: Some("abc123".into()),
        });

        assert_eq!(delivery.flush(Duration::from_millis(200)).await, 1);
        assert_eq!(delivery.pending_count(), 1);
    }
}
