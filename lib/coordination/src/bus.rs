//! Best-effort fan-out of execution status changes to other instances.

use crate::error::CoordinationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{ExecutionId, TaskId};
use scheduler_model::ExecutionStatus;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

const POLL_PERIOD: Duration = Duration::from_millis(500);
const CHANNEL_CAPACITY: usize = 256;

fn execution_status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Skipped => "skipped",
    }
}

fn parse_execution_status(raw: &str) -> Option<ExecutionStatus> {
    match raw {
        "running" => Some(ExecutionStatus::Running),
        "completed" => Some(ExecutionStatus::Completed),
        "failed" => Some(ExecutionStatus::Failed),
        "skipped" => Some(ExecutionStatus::Skipped),
        _ => None,
    }
}

/// A status change published for other instances to observe. Loss and
/// reordering are tolerated per `spec.md` §4.3.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStatusEvent {
    pub task_id: TaskId,
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub task_name: String,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

/// Publish/subscribe surface for execution status changes.
#[async_trait]
pub trait ExecutionBus: Send + Sync {
    /// Publishes an event. Best-effort: failures are logged by callers, not
    /// treated as execution failures.
    async fn publish(&self, event: ExecutionStatusEvent) -> Result<(), CoordinationError>;

    /// Subscribes to future events. Events published before the
    /// subscription are not replayed.
    fn subscribe(&self) -> broadcast::Receiver<ExecutionStatusEvent>;
}

/// Pure in-process bus, no database: local `broadcast` fan-out only. Useful
/// for tests and single-instance embeddings.
pub struct InProcessExecutionBus {
    sender: broadcast::Sender<ExecutionStatusEvent>,
}

impl Default for InProcessExecutionBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

#[async_trait]
impl ExecutionBus for InProcessExecutionBus {
    async fn publish(&self, event: ExecutionStatusEvent) -> Result<(), CoordinationError> {
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ExecutionStatusEvent> {
        self.sender.subscribe()
    }
}

#[derive(FromRow)]
struct EventRow {
    rowid: i64,
    task_id: String,
    execution_id: String,
    status: String,
    task_name: String,
    duration_ms: Option<i64>,
    error: Option<String>,
}

fn event_from_row(row: EventRow) -> Option<(i64, ExecutionStatusEvent)> {
    let task_id = TaskId::from_str(&row.task_id).ok()?;
    let execution_id = ExecutionId::from_str(&row.execution_id).ok()?;
    let status = parse_execution_status(&row.status)?;
    Some((
        row.rowid,
        ExecutionStatusEvent {
            task_id,
            execution_id,
            status,
            task_name: row.task_name,
            duration_ms: row.duration_ms,
            error: row.error,
        },
    ))
}

/// SQLite-outbox-backed `ExecutionBus`: events are persisted to an
/// append-only table and fanned out to local subscribers by a polling task,
/// so cross-process instances sharing the same file observe them too.
pub struct SqliteExecutionBus {
    pool: SqlitePool,
    sender: broadcast::Sender<ExecutionStatusEvent>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteExecutionBus {
    /// Creates the bus and its backing table if missing.
    pub async fn connect(pool: SqlitePool) -> Result<Self, CoordinationError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS execution_events (
                task_id TEXT NOT NULL,
                execution_id TEXT NOT NULL,
                status TEXT NOT NULL,
                task_name TEXT NOT NULL,
                duration_ms INTEGER,
                error TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&pool)
        .await?;

        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self {
            pool,
            sender,
            poll_task: Mutex::new(None),
        })
    }

    /// Starts the background poller. Idempotent.
    pub fn start_polling(&self) {
        let mut guard = self.poll_task.lock().expect("poll task mutex poisoned");
        if guard.is_some() {
            return;
        }
        let pool = self.pool.clone();
        let sender = self.sender.clone();
        let handle = tokio::spawn(async move {
            let mut last_seen: i64 = 0;
            let mut ticker = interval(POLL_PERIOD);
            loop {
                ticker.tick().await;
                let rows: Result<Vec<EventRow>, sqlx::Error> = sqlx::query_as(
                    "SELECT rowid, task_id, execution_id, status, task_name, duration_ms, error \
                     FROM execution_events WHERE rowid > ? ORDER BY rowid ASC",
                )
                .bind(last_seen)
                .fetch_all(&pool)
                .await;
                match rows {
                    Ok(rows) => {
                        for row in rows {
                            if let Some((rowid, event)) = event_from_row(row) {
                                last_seen = last_seen.max(rowid);
                                let _ = sender.send(event);
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "execution bus poll failed");
                    }
                }
            }
        });
        *guard = Some(handle);
    }

    /// Stops the background poller.
    pub fn stop_polling(&self) {
        if let Some(handle) = self.poll_task.lock().expect("poll task mutex poisoned").take() {
            handle.abort();
        }
    }

    /// Deletes events older than `max_age_days`, mirroring the retention
    /// cadence applied to execution records. Returns the count removed.
    pub async fn trim_before(&self, max_age_days: i64) -> Result<u64, CoordinationError> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        let result = sqlx::query("DELETE FROM execution_events WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ExecutionBus for SqliteExecutionBus {
    async fn publish(&self, event: ExecutionStatusEvent) -> Result<(), CoordinationError> {
        sqlx::query(
            "INSERT INTO execution_events \
             (task_id, execution_id, status, task_name, duration_ms, error, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.task_id.to_string())
        .bind(event.execution_id.to_string())
        .bind(execution_status_str(event.status))
        .bind(&event.task_name)
        .bind(event.duration_ms)
        .bind(&event.error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ExecutionStatusEvent> {
        self.sender.subscribe()
    }
}

impl Drop for SqliteExecutionBus {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bus.db");
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

    fn sample_event() -> ExecutionStatusEvent {
        ExecutionStatusEvent {
            task_id: TaskId::new(),
            execution_id: ExecutionId::new(),
            status: ExecutionStatus::Completed,
            task_name: "demo".to_string(),
            duration_ms: Some(12),
            error: None,
        }
    }

    #[tokio::test]
    async fn in_process_bus_delivers_to_subscriber() {
        let bus = InProcessExecutionBus::default();
        let mut rx = bus.subscribe();
        let event = sample_event();
        bus.publish(event.clone()).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn sqlite_bus_fans_out_via_poller() {
        let (pool, _dir) = temp_pool().await;
        let bus = SqliteExecutionBus::connect(pool).await.unwrap();
        bus.start_polling();
        let mut rx = bus.subscribe();

        let event = sample_event();
        bus.publish(event.clone()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event delivered before timeout")
            .unwrap();
        assert_eq!(received.task_id, event.task_id);
        assert_eq!(received.status, event.status);
    }

    #[tokio::test]
    async fn trim_before_removes_only_expired_rows() {
        let (pool, _dir) = temp_pool().await;
        let bus = SqliteExecutionBus::connect(pool).await.unwrap();
        bus.publish(sample_event()).await.unwrap();

        let removed = bus.trim_before(30).await.unwrap();
        assert_eq!(removed, 0);
    }
}
