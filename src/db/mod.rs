use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod kv_store;
mod migrations;

use migrations::run_migrations;

use crate::recovery::KeyValueStore;

type Reply<T> = oneshot::Sender<Result<T>>;

enum DbCommand {
    Get { key: String, reply: Reply<Option<String>> },
    Set { key: String, value: String, reply: Reply<()> },
    Remove { key: String, reply: Reply<()> },
    Shutdown,
}

impl DbCommand {
    /// Runs one command against the connection. Returns `false` on shutdown.
    fn run(self, conn: &Connection) -> bool {
        let delivered = match self {
            DbCommand::Get { key, reply } => reply.send(kv_store::read(conn, &key)).is_ok(),
            DbCommand::Set { key, value, reply } => {
                reply.send(kv_store::upsert(conn, &key, &value)).is_ok()
            }
            DbCommand::Remove { key, reply } => reply.send(kv_store::delete(conn, &key)).is_ok(),
            DbCommand::Shutdown => return false,
        };
        if !delivered {
            error!("DB caller dropped before receiving result");
        }
        true
    }
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// Durable key-value file for session recovery. The SQLite connection lives
/// on its own thread; async callers exchange commands with it.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("readtrack-db".into())
            .spawn(move || {
                let opened = Connection::open(&path_for_thread)
                    .context("failed to open SQLite database")
                    .and_then(|mut conn| {
                        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                            error!("Failed to enable WAL mode: {err}");
                        }
                        run_migrations(&mut conn).context("failed to prepare kv schema")?;
                        Ok(conn)
                    });

                let conn = match opened {
                    Ok(conn) => {
                        if ready_tx.send(Ok(())).is_err() {
                            return;
                        }
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                while let Ok(command) = command_rx.recv() {
                    if !command.run(&conn) {
                        break;
                    }
                }

                info!("Recovery database thread shutting down");
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Recovery database ready at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> DbCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .sender
            .send(command(reply_tx))
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.request(|reply| DbCommand::Get { key, reply }).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.request(|reply| DbCommand::Set { key, value, reply }).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| DbCommand::Remove { key, reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{session_key, SessionRecoveryStore};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn key_value_round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("readtrack.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            db.set("a", "1").await.unwrap();
            db.set("a", "2").await.unwrap();
            db.set("b", "x").await.unwrap();
            db.remove("b").await.unwrap();
        }

        let db = Database::new(path).unwrap();
        assert_eq!(db.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(db.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn backs_the_recovery_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("readtrack.sqlite3")).unwrap();
        let store = SessionRecoveryStore::new(Arc::new(db.clone()), Duration::from_secs(120));

        store.save(42, "abc123").await;
        assert_eq!(db.get(&session_key(42)).await.unwrap().as_deref(), Some("abc123"));
        assert_eq!(store.get(42).await.as_deref(), Some("abc123"));

        store.clear(42).await;
        assert_eq!(db.get(&session_key(42)).await.unwrap(), None);
    }
}
