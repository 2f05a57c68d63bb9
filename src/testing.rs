//! Fakes shared by the tracker tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{ReadLogResponse, SyncLogEntry};
use crate::sync::{DurableDelivery, ReadLogClient, SyncError};

#[derive(Debug, Clone)]
pub enum Scripted {
    Conflict,
    NetworkDown,
    Malformed,
}

/// Aggregator stand-in. Echoes the session id it is sent, mints
/// `session-N` when there is none, and plays scripted failures first.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    requests: Mutex<Vec<SyncLogEntry>>,
    script: Mutex<VecDeque<Scripted>>,
    minted: AtomicUsize,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn push(&self, scripted: Scripted) {
        self.script.lock().unwrap().push_back(scripted);
    }

    pub fn requests(&self) -> Vec<SyncLogEntry> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadLogClient for ScriptedClient {
    async fn log_read(&self, entry: &SyncLogEntry) -> Result<ReadLogResponse, SyncError> {
        self.requests.lock().unwrap().push(entry.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(Scripted::Conflict) => Err(SyncError::SessionConflict),
            Some(Scripted::NetworkDown) => Err(SyncError::Network("connection refused".into())),
            Some(Scripted::Malformed) => Err(SyncError::MalformedResponse("expected value".into())),
            None => {
                let session_id = entry.session_id.clone().unwrap_or_else(|| {
                    format!("session-{}", self.minted.fetch_add(1, Ordering::SeqCst) + 1)
                });
                Ok(ReadLogResponse {
                    session_id: Some(session_id),
                })
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingDelivery {
    delivered: Mutex<Vec<SyncLogEntry>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<SyncLogEntry> {
        self.delivered.lock().unwrap().clone()
    }
}

impl DurableDelivery for RecordingDelivery {
    fn deliver(&self, entry: SyncLogEntry) -> bool {
        self.delivered.lock().unwrap().push(entry);
        true
    }
}
