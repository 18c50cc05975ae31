//! Leader election among instances sharing a storage realm.
//!
//! Strategy 2 from `spec.md` §4.3: a heartbeat row rewritten every 2s by the
//! current leader, claimable by any instance once the row is older than 5s.

use crate::error::CoordinationError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

const RENEW_PERIOD: Duration = Duration::from_secs(2);
const STALE_AFTER_SECS: i64 = 5;

/// Subscription-based leadership status for a single scheduler instance.
#[async_trait]
pub trait LeaderLock: Send + Sync {
    /// Starts participating in election for this realm. Idempotent.
    async fn start(&self) -> Result<(), CoordinationError>;

    /// Releases leadership (if held) and stops participating.
    async fn stop(&self) -> Result<(), CoordinationError>;

    /// Current leadership status, updated as elections resolve.
    fn is_leader(&self) -> bool;

    /// Subscribes to leadership transitions; fires on every change.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Heartbeat-table-backed `LeaderLock`, shared by every instance pointed at
/// the same SQLite file.
pub struct SqliteLeaderLock {
    pool: SqlitePool,
    realm: String,
    holder_id: String,
    is_leader: Arc<AtomicBool>,
    sender: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteLeaderLock {
    /// Creates a new lock participant for `realm`, identified by a fresh ULID.
    #[must_use]
    pub fn new(pool: SqlitePool, realm: impl Into<String>) -> Self {
        Self::with_holder_id(pool, realm, ulid::Ulid::new().to_string())
    }

    /// Creates a new lock participant with an explicit holder id, primarily
    /// for deterministic tests.
    #[must_use]
    pub fn with_holder_id(pool: SqlitePool, realm: impl Into<String>, holder_id: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            pool,
            realm: realm.into(),
            holder_id: holder_id.into(),
            is_leader: Arc::new(AtomicBool::new(false)),
            sender,
            task: Mutex::new(None),
        }
    }

    async fn ensure_schema(&self) -> Result<(), CoordinationError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS leader_lock (
                realm TEXT PRIMARY KEY,
                holder_id TEXT NOT NULL,
                renewed_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Attempts to either renew (if currently leader) or claim (if the
    /// recorded heartbeat is stale) leadership in one atomic statement.
    async fn try_advance(&self) -> Result<bool, CoordinationError> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::seconds(STALE_AFTER_SECS);

        let inserted = sqlx::query(
            "INSERT INTO leader_lock (realm, holder_id, renewed_at) VALUES (?, ?, ?) \
             ON CONFLICT(realm) DO NOTHING",
        )
        .bind(&self.realm)
        .bind(&self.holder_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() > 0 {
            return Ok(true);
        }

        let renewed = sqlx::query(
            "UPDATE leader_lock SET renewed_at = ? WHERE realm = ? AND holder_id = ?",
        )
        .bind(now)
        .bind(&self.realm)
        .bind(&self.holder_id)
        .execute(&self.pool)
        .await?;
        if renewed.rows_affected() > 0 {
            return Ok(true);
        }

        let claimed = sqlx::query(
            "UPDATE leader_lock SET holder_id = ?, renewed_at = ? \
             WHERE realm = ? AND renewed_at < ?",
        )
        .bind(&self.holder_id)
        .bind(now)
        .bind(&self.realm)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(claimed.rows_affected() > 0)
    }

    fn set_leader(&self, leader: bool) {
        if self.is_leader.swap(leader, Ordering::SeqCst) != leader {
            let _ = self.sender.send(leader);
            if leader {
                tracing::info!(realm = %self.realm, holder = %self.holder_id, "acquired leadership");
            } else {
                tracing::info!(realm = %self.realm, holder = %self.holder_id, "lost leadership");
            }
        }
    }
}

#[async_trait]
impl LeaderLock for SqliteLeaderLock {
    async fn start(&self) -> Result<(), CoordinationError> {
        if self.task.lock().await.is_some() {
            return Ok(());
        }
        self.ensure_schema().await?;

        match self.try_advance().await {
            Ok(leader) => self.set_leader(leader),
            Err(err) => {
                tracing::warn!(error = %err, "initial leader claim failed");
            }
        }

        let pool = self.pool.clone();
        let realm = self.realm.clone();
        let holder_id = self.holder_id.clone();
        let is_leader = Arc::clone(&self.is_leader);
        let sender = self.sender.clone();

        let handle = tokio::spawn(async move {
            let lock = SqliteLeaderLock {
                pool,
                realm,
                holder_id,
                is_leader,
                sender,
                task: Mutex::new(None),
            };
            let mut ticker = interval(RENEW_PERIOD);
            loop {
                ticker.tick().await;
                match lock.try_advance().await {
                    Ok(leader) => lock.set_leader(leader),
                    Err(err) => {
                        tracing::warn!(error = %err, "leader heartbeat failed");
                    }
                }
            }
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoordinationError> {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        if self.is_leader.load(Ordering::SeqCst) {
            sqlx::query("DELETE FROM leader_lock WHERE realm = ? AND holder_id = ?")
                .bind(&self.realm)
                .bind(&self.holder_id)
                .execute(&self.pool)
                .await?;
        }
        self.set_leader(false);
        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Always-leader lock for single-instance use and as the fallback described
/// in `spec.md` §7: when neither a native lock nor the heartbeat table is
/// available, an instance assumes leadership for its own process only.
pub struct SoloLeaderLock {
    sender: watch::Sender<bool>,
}

impl Default for SoloLeaderLock {
    fn default() -> Self {
        let (sender, _) = watch::channel(true);
        Self { sender }
    }
}

#[async_trait]
impl LeaderLock for SoloLeaderLock {
    async fn start(&self) -> Result<(), CoordinationError> {
        let _ = self.sender.send(true);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoordinationError> {
        let _ = self.sender.send(false);
        Ok(())
    }

    fn is_leader(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("leader.db");
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true),
            )
            .await
            .expect("connect");
        (pool, dir)
    }

    #[tokio::test]
    async fn solo_lock_is_always_leader() {
        let lock = SoloLeaderLock::default();
        lock.start().await.unwrap();
        assert!(lock.is_leader());
    }

    #[tokio::test]
    async fn first_claimant_becomes_leader() {
        let (pool, _dir) = temp_pool().await;
        let lock = SqliteLeaderLock::with_holder_id(pool, "realm-a", "instance-1");
        lock.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(lock.is_leader());
        lock.stop().await.unwrap();
    }

    #[tokio::test]
    async fn second_claimant_waits_until_stale() {
        let (pool, _dir) = temp_pool().await;
        let first = SqliteLeaderLock::with_holder_id(pool.clone(), "realm-b", "instance-1");
        first.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(first.is_leader());

        let second = SqliteLeaderLock::with_holder_id(pool, "realm-b", "instance-2");
        assert!(!second.try_advance().await.unwrap());
        first.stop().await.unwrap();
    }
}
