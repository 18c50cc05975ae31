//! The durable, SQLite-backed `Store` implementation.

use crate::error::StoreError;
use crate::traits::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{ExecutionId, TaskId};
use scheduler_model::{
    LogEntry, ScheduledTask, SchedulerStatistics, TaskConfig, TaskExecution, TaskFilter,
    TaskStatus, TaskTrigger,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Row, SqlitePool};
use std::str::FromStr;

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Active => "active",
        TaskStatus::Paused => "paused",
        TaskStatus::Expired => "expired",
    }
}

fn parse_task_status(raw: &str) -> Option<TaskStatus> {
    match raw {
        "active" => Some(TaskStatus::Active),
        "paused" => Some(TaskStatus::Paused),
        "expired" => Some(TaskStatus::Expired),
        _ => None,
    }
}

fn execution_status_str(status: scheduler_model::ExecutionStatus) -> &'static str {
    use scheduler_model::ExecutionStatus as ES;
    match status {
        ES::Running => "running",
        ES::Completed => "completed",
        ES::Failed => "failed",
        ES::Skipped => "skipped",
    }
}

fn parse_execution_status(raw: &str) -> Option<scheduler_model::ExecutionStatus> {
    use scheduler_model::ExecutionStatus as ES;
    match raw {
        "running" => Some(ES::Running),
        "completed" => Some(ES::Completed),
        "failed" => Some(ES::Failed),
        "skipped" => Some(ES::Skipped),
        _ => None,
    }
}

/// Flat row shape for the `tasks` table. Nested structures are stored as
/// JSON text blobs and expanded in [`task_from_row`].
#[derive(FromRow)]
struct TaskRow {
    id: String,
    name: String,
    description: Option<String>,
    tags: String,
    task_type: String,
    trigger: String,
    payload: String,
    config: String,
    notification: String,
    status: String,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
    run_count: i64,
    success_count: i64,
    failure_count: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn task_from_row(row: TaskRow) -> Option<ScheduledTask> {
    let id = match TaskId::from_str(&row.id) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping task row with unparseable id");
            return None;
        }
    };
    let status = match parse_task_status(&row.status) {
        Some(status) => status,
        None => {
            tracing::warn!(id = %row.id, status = %row.status, "skipping task row with unknown status");
            return None;
        }
    };

    let tags: Vec<String> = match serde_json::from_str(&row.tags) {
        Ok(tags) => tags,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping task row with corrupt tags");
            return None;
        }
    };
    let trigger: TaskTrigger = match serde_json::from_str(&row.trigger) {
        Ok(trigger) => trigger,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping task row with corrupt trigger");
            return None;
        }
    };
    let payload = match serde_json::from_str(&row.payload) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping task row with corrupt payload");
            return None;
        }
    };
    let config: TaskConfig = match serde_json::from_str(&row.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping task row with corrupt config");
            return None;
        }
    };
    let notification = match serde_json::from_str(&row.notification) {
        Ok(notification) => notification,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping task row with corrupt notification");
            return None;
        }
    };

    Some(ScheduledTask {
        id,
        name: row.name,
        description: row.description,
        tags,
        task_type: row.task_type,
        trigger,
        payload,
        config,
        notification,
        status,
        last_run_at: row.last_run_at,
        next_run_at: row.next_run_at,
        run_count: row.run_count.max(0) as u64,
        success_count: row.success_count.max(0) as u64,
        failure_count: row.failure_count.max(0) as u64,
        last_error: row.last_error,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    task_id: String,
    task_name: String,
    task_type: String,
    status: String,
    input: Option<String>,
    output: Option<String>,
    error: Option<String>,
    retry_attempt: i64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    logs: String,
}

fn execution_from_row(row: ExecutionRow) -> Option<TaskExecution> {
    let id = match ExecutionId::from_str(&row.id) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping execution row with unparseable id");
            return None;
        }
    };
    let task_id = match TaskId::from_str(&row.task_id) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping execution row with unparseable task id");
            return None;
        }
    };
    let status = match parse_execution_status(&row.status) {
        Some(status) => status,
        None => {
            tracing::warn!(id = %row.id, status = %row.status, "skipping execution row with unknown status");
            return None;
        }
    };
    let input = match row.input.as_deref().map(serde_json::from_str).transpose() {
        Ok(input) => input,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping execution row with corrupt input");
            return None;
        }
    };
    let output = match row.output.as_deref().map(serde_json::from_str).transpose() {
        Ok(output) => output,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping execution row with corrupt output");
            return None;
        }
    };
    let logs: Vec<LogEntry> = match serde_json::from_str(&row.logs) {
        Ok(logs) => logs,
        Err(err) => {
            tracing::warn!(id = %row.id, error = %err, "skipping execution row with corrupt logs");
            return None;
        }
    };

    Some(TaskExecution {
        id,
        task_id,
        task_name: row.task_name,
        task_type: row.task_type,
        status,
        input,
        output,
        error: row.error,
        retry_attempt: row.retry_attempt.max(0) as u32,
        started_at: row.started_at,
        completed_at: row.completed_at,
        duration_ms: row.duration_ms,
        logs,
    })
}

/// Durable store backed by a local SQLite file, shared across co-located
/// instances of the same client.
pub struct SqliteStore {
    pool: SqlitePool,
}

const TASK_COLUMNS: &str = "id, name, description, tags, task_type, trigger, payload, config, \
    notification, status, last_run_at, next_run_at, run_count, success_count, failure_count, \
    last_error, created_at, updated_at";

const EXECUTION_COLUMNS: &str = "id, task_id, task_name, task_type, status, input, output, error, \
    retry_attempt, started_at, completed_at, duration_ms, logs";

impl SqliteStore {
    /// Opens (creating if necessary) a SQLite database at `path` and runs
    /// schema migrations.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|err| StoreError::Database { reason: err.to_string() })?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wraps an already-connected, already-migrated pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the schema if it does not already exist, and applies the
    /// v1 -> v2 index migration described in `spec.md` §6.4.
    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                tags TEXT NOT NULL,
                task_type TEXT NOT NULL,
                trigger TEXT NOT NULL,
                payload TEXT NOT NULL,
                config TEXT NOT NULL,
                notification TEXT NOT NULL,
                status TEXT NOT NULL,
                last_run_at TEXT,
                next_run_at TEXT,
                run_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                task_name TEXT NOT NULL,
                task_type TEXT NOT NULL,
                status TEXT NOT NULL,
                input TEXT,
                output TEXT,
                error TEXT,
                retry_attempt INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                duration_ms INTEGER,
                logs TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_next_run_at ON tasks (next_run_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status_next_run_at ON tasks (status, next_run_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_task_id ON executions (task_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions (status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_started_at ON executions (started_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_task_started ON executions (task_id, started_at)")
            .execute(&self.pool)
            .await?;

        let version: Option<(String,)> = sqlx::query_as("SELECT value FROM schema_meta WHERE key = 'version'")
            .fetch_optional(&self.pool)
            .await?;
        let current: u32 = version.and_then(|(v,)| v.parse().ok()).unwrap_or(1);
        if current < 2 {
            sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status_type ON tasks (status, task_type)")
                .execute(&self.pool)
                .await?;
            sqlx::query(
                "INSERT INTO schema_meta (key, value) VALUES ('version', '2') \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn upsert_task(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let tags_json = serde_json::to_string(&task.tags)?;
        let trigger_json = serde_json::to_string(&task.trigger)?;
        let payload_json = serde_json::to_string(&task.payload)?;
        let config_json = serde_json::to_string(&task.config)?;
        let notification_json = serde_json::to_string(&task.notification)?;

        sqlx::query(
            r"
            INSERT INTO tasks
                (id, name, description, tags, task_type, trigger, payload, config,
                 notification, status, last_run_at, next_run_at, run_count, success_count,
                 failure_count, last_error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                tags = excluded.tags,
                task_type = excluded.task_type,
                trigger = excluded.trigger,
                payload = excluded.payload,
                config = excluded.config,
                notification = excluded.notification,
                status = excluded.status,
                last_run_at = excluded.last_run_at,
                next_run_at = excluded.next_run_at,
                run_count = excluded.run_count,
                success_count = excluded.success_count,
                failure_count = excluded.failure_count,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            ",
        )
        .bind(task.id.to_string())
        .bind(&task.name)
        .bind(&task.description)
        .bind(tags_json)
        .bind(&task.task_type)
        .bind(trigger_json)
        .bind(payload_json)
        .bind(config_json)
        .bind(notification_json)
        .bind(task_status_str(task.status))
        .bind(task.last_run_at)
        .bind(task.next_run_at)
        .bind(task.run_count as i64)
        .bind(task.success_count as i64)
        .bind(task.failure_count as i64)
        .bind(&task.last_error)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_task(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM tasks WHERE id = ?")
            .bind(task.id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(StoreError::TaskAlreadyExists {
                id: task.id.to_string(),
            });
        }
        self.upsert_task(task).await
    }

    async fn update_task(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        self.upsert_task(task).await
    }

    async fn delete_task(&self, id: TaskId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM executions WHERE task_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<ScheduledTask>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(task_from_row))
    }

    async fn get_all_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().filter_map(task_from_row).collect())
    }

    async fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<ScheduledTask>, StoreError> {
        let rows: Vec<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?"))
                .bind(task_status_str(status))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().filter_map(task_from_row).collect())
    }

    async fn get_active_event_tasks(&self, event_type: Option<&str>) -> Result<Vec<ScheduledTask>, StoreError> {
        let rows: Vec<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'active'"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .filter_map(task_from_row)
            .filter(|task| match &task.trigger {
                TaskTrigger::Event { event_type: ty, .. } => {
                    event_type.is_none_or(|requested| requested == ty)
                }
                _ => false,
            })
            .collect())
    }

    async fn get_upcoming_tasks(&self, limit: u32) -> Result<Vec<ScheduledTask>, StoreError> {
        let now = Utc::now();
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'active' AND next_run_at > ? \
             ORDER BY next_run_at ASC LIMIT ?"
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(task_from_row).collect())
    }

    async fn get_filtered_tasks(&self, filter: &TaskFilter) -> Result<Vec<ScheduledTask>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks"))
            .fetch_all(&self.pool)
            .await?;
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        Ok(rows
            .into_iter()
            .filter_map(task_from_row)
            .filter(|task| filter.statuses.is_empty() || filter.statuses.contains(&task.status))
            .filter(|task| filter.types.is_empty() || filter.types.contains(&task.task_type))
            .filter(|task| filter.tags.is_empty() || filter.tags.iter().all(|tag| task.tags.contains(tag)))
            .filter(|task| {
                search.as_ref().is_none_or(|needle| {
                    task.name.to_lowercase().contains(needle)
                        || task
                            .description
                            .as_ref()
                            .is_some_and(|d| d.to_lowercase().contains(needle))
                })
            })
            .collect())
    }

    async fn create_execution(&self, execution: &TaskExecution) -> Result<(), StoreError> {
        self.update_execution(execution).await
    }

    async fn update_execution(&self, execution: &TaskExecution) -> Result<(), StoreError> {
        let input_json = execution.input.as_ref().map(serde_json::to_string).transpose()?;
        let output_json = execution.output.as_ref().map(serde_json::to_string).transpose()?;
        let logs_json = serde_json::to_string(&execution.logs)?;

        sqlx::query(&format!(
            "INSERT INTO executions ({EXECUTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, output = excluded.output, \
             error = excluded.error, completed_at = excluded.completed_at, \
             duration_ms = excluded.duration_ms, logs = excluded.logs"
        ))
        .bind(execution.id.to_string())
        .bind(execution.task_id.to_string())
        .bind(&execution.task_name)
        .bind(&execution.task_type)
        .bind(execution_status_str(execution.status))
        .bind(input_json)
        .bind(output_json)
        .bind(&execution.error)
        .bind(i64::from(execution.retry_attempt))
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.duration_ms)
        .bind(logs_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<TaskExecution>, StoreError> {
        let row: Option<ExecutionRow> =
            sqlx::query_as(&format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(execution_from_row))
    }

    async fn get_task_executions(
        &self,
        task_id: TaskId,
        limit: u32,
        before_started_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<TaskExecution>, StoreError> {
        let rows: Vec<ExecutionRow> = match before_started_at {
            Some(cursor) => {
                sqlx::query_as(&format!(
                    "SELECT {EXECUTION_COLUMNS} FROM executions WHERE task_id = ? AND started_at < ? \
                     ORDER BY started_at DESC LIMIT ?"
                ))
                .bind(task_id.to_string())
                .bind(cursor)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {EXECUTION_COLUMNS} FROM executions WHERE task_id = ? \
                     ORDER BY started_at DESC LIMIT ?"
                ))
                .bind(task_id.to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().filter_map(execution_from_row).collect())
    }

    async fn get_recent_executions(&self, limit: u32) -> Result<Vec<TaskExecution>, StoreError> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions ORDER BY started_at DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(execution_from_row).collect())
    }

    async fn cleanup_old_executions(&self, max_age_days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        let result = sqlx::query("DELETE FROM executions WHERE started_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_statistics(&self) -> Result<SchedulerStatistics, StoreError> {
        let now = Utc::now();

        let total_tasks: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks").fetch_one(&self.pool).await?;
        let active_tasks: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = 'active'")
            .fetch_one(&self.pool)
            .await?;
        let paused_tasks: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = 'paused'")
            .fetch_one(&self.pool)
            .await?;
        let upcoming_count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE status = 'active' AND next_run_at > ?",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let total_executions: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM executions").fetch_one(&self.pool).await?;
        let completed_executions: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM executions WHERE status = 'completed'")
                .fetch_one(&self.pool)
                .await?;
        let failed_executions: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM executions WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;
        let average_row = sqlx::query("SELECT AVG(duration_ms) FROM executions WHERE status = 'completed'")
            .fetch_one(&self.pool)
            .await?;
        let average_duration_ms: Option<f64> = average_row
            .try_get::<Option<f64>, _>(0)
            .unwrap_or_default();

        Ok(SchedulerStatistics {
            total_tasks: total_tasks.0.max(0) as u64,
            active_tasks: active_tasks.0.max(0) as u64,
            paused_tasks: paused_tasks.0.max(0) as u64,
            upcoming_count: upcoming_count.0.max(0) as u64,
            total_executions: total_executions.0.max(0) as u64,
            completed_executions: completed_executions.0.max(0) as u64,
            failed_executions: failed_executions.0.max(0) as u64,
            average_duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_model::{CreateTaskInput, NotificationConfig};
    use serde_json::Value as JsonValue;

    async fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scheduler.db");
        let store = SqliteStore::connect(&format!("sqlite://{}", path.display()))
            .await
            .expect("connect");
        (store, dir)
    }

    fn sample_task(name: &str) -> ScheduledTask {
        ScheduledTask::from_input(CreateTaskInput {
            name: name.to_string(),
            description: None,
            tags: vec!["demo".to_string()],
            task_type: "workflow".to_string(),
            trigger: TaskTrigger::Interval { interval_ms: 60_000 },
            payload: JsonValue::Null,
            config: TaskConfig::default(),
            notification: NotificationConfig::default(),
        })
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (store, _dir) = temp_store().await;
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();
        let fetched = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "t1");
        assert_eq!(fetched.tags, vec!["demo".to_string()]);
    }

    #[tokio::test]
    async fn create_task_rejects_duplicate_id() {
        let (store, _dir) = temp_store().await;
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();
        let err = store.create_task(&task).await.unwrap_err();
        assert!(matches!(err, StoreError::TaskAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn delete_task_is_transactional_with_executions() {
        let (store, _dir) = temp_store().await;
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();
        let execution = TaskExecution::start(task.id, "t1", "workflow", 0, None);
        store.create_execution(&execution).await.unwrap();

        assert!(store.delete_task(task.id).await.unwrap());
        assert!(store.get_execution(execution.id).await.unwrap().is_none());
        assert!(!store.delete_task(task.id).await.unwrap());
    }

    #[tokio::test]
    async fn paginated_executions_use_exclusive_cursor() {
        let (store, _dir) = temp_store().await;
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();

        let first = TaskExecution::start(task.id, "t1", "workflow", 0, None);
        store.create_execution(&first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = TaskExecution::start(task.id, "t1", "workflow", 0, None);
        store.create_execution(&second).await.unwrap();

        let page = store.get_task_executions(task.id, 10, Some(second.started_at)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, first.id);
    }

    #[tokio::test]
    async fn statistics_compute_average_duration() {
        let (store, _dir) = temp_store().await;
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();

        let mut execution = TaskExecution::start(task.id, "t1", "workflow", 0, None);
        execution.complete(None);
        store.create_execution(&execution).await.unwrap();

        let stats = store.get_statistics().await.unwrap();
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.completed_executions, 1);
        assert!(stats.average_duration_ms.is_some());
    }
}
