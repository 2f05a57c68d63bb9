//! Short-lived, content-keyed memory of the last session id, so a reload
//! inside the recovery window continues the same engagement session.

pub mod memory;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::settings::TrackerConfig;

pub use memory::MemoryKeyValueStore;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Durable string store with atomic single-key operations.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

pub fn session_key(content_id: u64) -> String {
    format!("reading_session_{content_id}")
}

pub fn timestamp_key(content_id: u64) -> String {
    format!("reading_session_{content_id}_timestamp")
}

/// Outcome of a sync, as far as the recovery record is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    Save(String),
    Clear,
    Keep,
}

#[derive(Clone)]
pub struct SessionRecoveryStore {
    backend: Arc<dyn KeyValueStore>,
    window: Duration,
    available: Arc<AtomicBool>,
}

impl SessionRecoveryStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, window: Duration) -> Self {
        Self {
            backend,
            window,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn from_config(backend: Arc<dyn KeyValueStore>, config: &TrackerConfig) -> Self {
        Self::new(backend, config.recovery_window())
    }

    /// A store that forgets everything with the process.
    pub fn in_memory(window: Duration) -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()), window)
    }

    /// `false` once the backend failed; recovery is then disabled for good.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub async fn save(&self, content_id: u64, session_id: &str) {
        if !self.is_available() {
            return;
        }

        let captured_at = Utc::now().timestamp_millis().to_string();
        let result = async {
            self.backend
                .set(&session_key(content_id), session_id)
                .await
                .context("failed to store session id")?;
            self.backend
                .set(&timestamp_key(content_id), &captured_at)
                .await
                .context("failed to store session timestamp")
        }
        .await;

        if let Err(err) = result {
            self.disable(content_id, err);
        }
    }

    /// Returns the stored session id if it was captured inside the recovery
    /// window. Stale or half-written records are purged.
    pub async fn get(&self, content_id: u64) -> Option<String> {
        if !self.is_available() {
            return None;
        }

        match self.lookup(content_id).await {
            Ok(found) => found,
            Err(err) => {
                self.disable(content_id, err);
                None
            }
        }
    }

    pub async fn clear(&self, content_id: u64) {
        if !self.is_available() {
            return;
        }

        if let Err(err) = self.purge(content_id).await {
            self.disable(content_id, err);
        }
    }

    pub async fn apply(&self, content_id: u64, action: RecoveryAction) {
        match action {
            RecoveryAction::Save(session_id) => self.save(content_id, &session_id).await,
            RecoveryAction::Clear => self.clear(content_id).await,
            RecoveryAction::Keep => {}
        }
    }

    async fn lookup(&self, content_id: u64) -> Result<Option<String>> {
        let Some(session_id) = self.backend.get(&session_key(content_id)).await? else {
            return Ok(None);
        };

        let captured_at = self
            .backend
            .get(&timestamp_key(content_id))
            .await?
            .and_then(|raw| raw.trim().parse::<i64>().ok());

        let Some(captured_at) = captured_at else {
            log_debug!("recovery record for {} has no timestamp; purging", content_id);
            self.purge(content_id).await?;
            return Ok(None);
        };

        let age_ms = Utc::now().timestamp_millis().saturating_sub(captured_at).max(0);
        if (age_ms as u128) < self.window.as_millis() {
            Ok(Some(session_id))
        } else {
            log_debug!(
                "recovery record for {} is {}ms old; purging",
                content_id,
                age_ms
            );
            self.purge(content_id).await?;
            Ok(None)
        }
    }

    async fn purge(&self, content_id: u64) -> Result<()> {
        self.backend
            .remove(&session_key(content_id))
            .await
            .context("failed to remove session id")?;
        self.backend
            .remove(&timestamp_key(content_id))
            .await
            .context("failed to remove session timestamp")
    }

    fn disable(&self, content_id: u64, err: anyhow::Error) {
        if self.available.swap(false, Ordering::AcqRel) {
            log_warn!(
                "session recovery disabled (content {}): {err:#}",
                content_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    const WINDOW: Duration = Duration::from_secs(120);

    async fn seed(store: &MemoryKeyValueStore, content_id: u64, session_id: &str, age: Duration) {
        let captured_at = Utc::now().timestamp_millis() - age.as_millis() as i64;
        store.set(&session_key(content_id), session_id).await.unwrap();
        store
            .set(&timestamp_key(content_id), &captured_at.to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fresh_record_is_reused() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        seed(&backend, 42, "abc123", Duration::from_secs(30)).await;
        let store = SessionRecoveryStore::new(backend, WINDOW);

        assert_eq!(store.get(42).await.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn stale_record_is_purged() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        seed(&backend, 42, "abc123", Duration::from_secs(120)).await;
        let store = SessionRecoveryStore::new(backend.clone(), WINDOW);

        assert_eq!(store.get(42).await, None);
        assert_eq!(backend.get(&session_key(42)).await.unwrap(), None);
        assert_eq!(backend.get(&timestamp_key(42)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_are_partitioned_by_content() {
        let store = SessionRecoveryStore::in_memory(WINDOW);
        store.save(1, "one").await;
        store.save(2, "two").await;
        store.clear(1).await;

        assert_eq!(store.get(1).await, None);
        assert_eq!(store.get(2).await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn garbage_timestamp_counts_as_stale() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        backend.set(&session_key(9), "s").await.unwrap();
        backend.set(&timestamp_key(9), "yesterday").await.unwrap();
        let store = SessionRecoveryStore::new(backend.clone(), WINDOW);

        assert_eq!(store.get(9).await, None);
        assert_eq!(backend.get(&session_key(9)).await.unwrap(), None);
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("storage quota exceeded"))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("storage quota exceeded"))
        }
        async fn remove(&self, _key: &str) -> Result<()> {
            Err(anyhow!("storage quota exceeded"))
        }
    }

    #[tokio::test]
    async fn unavailable_storage_degrades_to_memory_only() {
        let store = SessionRecoveryStore::new(Arc::new(BrokenStore), WINDOW);
        store.save(42, "abc").await;
        assert!(!store.is_available());

        assert_eq!(store.get(42).await, None);
        store.clear(42).await;
    }
}
