//! The `Store` trait consumed by the scheduler engine.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{ExecutionId, TaskId};
use scheduler_model::{ScheduledTask, SchedulerStatistics, TaskExecution, TaskFilter, TaskStatus};

/// Durable persistence of tasks and executions, per `spec.md` §4.2.
///
/// Implementations must be failure-tolerant on read: a row that fails to
/// deserialize is logged and skipped rather than propagated.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts a new task. Fails if `task.id` already exists.
    async fn create_task(&self, task: &ScheduledTask) -> Result<(), StoreError>;

    /// Upserts a task by id.
    async fn update_task(&self, task: &ScheduledTask) -> Result<(), StoreError>;

    /// Deletes a task and all of its executions in one transaction.
    /// Returns whether the task existed.
    async fn delete_task(&self, id: TaskId) -> Result<bool, StoreError>;

    /// Fetches a single task by id.
    async fn get_task(&self, id: TaskId) -> Result<Option<ScheduledTask>, StoreError>;

    /// Fetches every task, regardless of status.
    async fn get_all_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError>;

    /// Fetches every task with the given status.
    async fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<ScheduledTask>, StoreError>;

    /// Fetches active `event`-triggered tasks, optionally narrowed to a
    /// specific `event_type`.
    async fn get_active_event_tasks(&self, event_type: Option<&str>) -> Result<Vec<ScheduledTask>, StoreError>;

    /// Fetches up to `limit` active tasks with a future `next_run_at`,
    /// ascending by `next_run_at`.
    async fn get_upcoming_tasks(&self, limit: u32) -> Result<Vec<ScheduledTask>, StoreError>;

    /// Fetches tasks matching every non-empty criterion of `filter`.
    async fn get_filtered_tasks(&self, filter: &TaskFilter) -> Result<Vec<ScheduledTask>, StoreError>;

    /// Inserts a new execution record.
    async fn create_execution(&self, execution: &TaskExecution) -> Result<(), StoreError>;

    /// Updates an existing execution record.
    async fn update_execution(&self, execution: &TaskExecution) -> Result<(), StoreError>;

    /// Fetches a single execution by id.
    async fn get_execution(&self, id: ExecutionId) -> Result<Option<TaskExecution>, StoreError>;

    /// Fetches a task's executions, newest first, paginated with an
    /// exclusive `before_started_at` cursor.
    async fn get_task_executions(
        &self,
        task_id: TaskId,
        limit: u32,
        before_started_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<TaskExecution>, StoreError>;

    /// Fetches the most recent executions across all tasks, newest first.
    async fn get_recent_executions(&self, limit: u32) -> Result<Vec<TaskExecution>, StoreError>;

    /// Deletes executions older than `max_age_days`. Returns the count removed.
    async fn cleanup_old_executions(&self, max_age_days: i64) -> Result<u64, StoreError>;

    /// Computes aggregate statistics without loading full rows into memory.
    async fn get_statistics(&self) -> Result<SchedulerStatistics, StoreError>;
}
