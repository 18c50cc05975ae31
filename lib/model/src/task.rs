//! The durable task definition.

use crate::trigger::TaskTrigger;
use chrono::{DateTime, Utc};
use scheduler_core::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lifecycle state of a task. Only `Active` tasks are considered for firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Eligible for scheduling.
    Active,
    /// Suspended; timers are cancelled and it is skipped by sweeps.
    Paused,
    /// Terminal; a `once` trigger that has already fired.
    Expired,
}

/// Execution-policy knobs for a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Maximum wall-clock time (ms) an execution may run before being aborted.
    pub timeout_ms: i64,
    /// Maximum number of retry attempts after the first failure.
    pub max_retries: u32,
    /// Base retry delay (ms) used by the exponential backoff formula.
    pub retry_delay_ms: i64,
    /// Upper bound (ms) on any single retry delay. Defaults to 60s when unset.
    pub max_retry_delay_ms: Option<i64>,
    /// Whether a task missed while this instance was down should run once on
    /// startup if it slipped by less than a minute.
    pub run_missed_on_startup: bool,
    /// Whether more than one execution of this task may be `running` at once.
    pub allow_concurrent: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 0,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: None,
            run_missed_on_startup: false,
            allow_concurrent: false,
        }
    }
}

impl TaskConfig {
    /// Effective cap on retry delay, defaulting to 60 seconds.
    #[must_use]
    pub fn effective_max_retry_delay_ms(&self) -> i64 {
        self.max_retry_delay_ms.unwrap_or(60_000)
    }
}

/// Notification routing preferences for a task's executions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Call the sink on execution start.
    pub on_start: bool,
    /// Call the sink on successful completion.
    pub on_complete: bool,
    /// Call the sink on failure.
    pub on_error: bool,
    /// Named channels the external transport should use.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Optional webhook URL the external transport may post to.
    pub webhook_url: Option<String>,
}

/// The durable definition of something the scheduler runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Unique identifier.
    pub id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Ordered, caller-defined tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Key into the executor registry.
    pub task_type: String,
    /// Firing rule.
    pub trigger: TaskTrigger,
    /// Opaque, executor-specific payload. Never interpreted by the core.
    #[serde(default)]
    pub payload: JsonValue,
    /// Execution policy.
    pub config: TaskConfig,
    /// Notification routing.
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// When the task last fired, if ever.
    pub last_run_at: Option<DateTime<Utc>>,
    /// The next computed firing instant, if any (see `spec.md` §3.2 invariant 2).
    pub next_run_at: Option<DateTime<Utc>>,
    /// Total number of executions that reached the pipeline.
    pub run_count: u64,
    /// Number of executions that completed successfully.
    pub success_count: u64,
    /// Number of executions that failed (after retries are exhausted or not).
    pub failure_count: u64,
    /// The most recent failure message, cleared on success.
    pub last_error: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new task; everything else takes a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateTaskInput {
    /// Human-readable name.
    pub name: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Ordered, caller-defined tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Key into the executor registry.
    pub task_type: String,
    /// Firing rule.
    pub trigger: TaskTrigger,
    /// Opaque, executor-specific payload.
    #[serde(default)]
    pub payload: JsonValue,
    /// Execution policy; defaults applied for any missing fields via `TaskConfig::default`.
    #[serde(default)]
    pub config: TaskConfig,
    /// Notification routing; defaults to all-disabled.
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// A partial update to an existing task. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    /// New name, if changing.
    pub name: Option<String>,
    /// New description, if changing. `Some(None)` clears it.
    pub description: Option<Option<String>>,
    /// New tag set, if changing.
    pub tags: Option<Vec<String>>,
    /// New task type, if changing.
    pub task_type: Option<String>,
    /// New trigger, if changing. Triggers a `nextRunAt` recomputation.
    pub trigger: Option<TaskTrigger>,
    /// New payload, if changing.
    pub payload: Option<JsonValue>,
    /// New execution policy, if changing.
    pub config: Option<TaskConfig>,
    /// New notification routing, if changing.
    pub notification: Option<NotificationConfig>,
    /// New lifecycle status, if changing. Prefer `pause_task`/`resume_task`
    /// for the documented transitions; this exists for direct corrections.
    pub status: Option<TaskStatus>,
}

impl ScheduledTask {
    /// Creates a new `Active` task from a [`CreateTaskInput`], with fresh
    /// identifiers and timestamps. `next_run_at` is left `None`; the caller
    /// (the scheduler) computes it via `computeNextRun` before persisting.
    #[must_use]
    pub fn from_input(input: CreateTaskInput) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            name: input.name,
            description: input.description,
            tags: input.tags,
            task_type: input.task_type,
            trigger: input.trigger,
            payload: input.payload,
            config: input.config,
            notification: input.notification,
            status: TaskStatus::Active,
            last_run_at: None,
            next_run_at: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a patch in place, returning whether the trigger changed (the
    /// caller must recompute `next_run_at` when this is `true`).
    pub fn apply_patch(&mut self, patch: TaskPatch) -> bool {
        let mut trigger_changed = false;

        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(task_type) = patch.task_type {
            self.task_type = task_type;
        }
        if let Some(trigger) = patch.trigger {
            self.trigger = trigger;
            trigger_changed = true;
        }
        if let Some(payload) = patch.payload {
            self.payload = payload;
        }
        if let Some(config) = patch.config {
            self.config = config;
        }
        if let Some(notification) = patch.notification {
            self.notification = notification;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }

        self.updated_at = Utc::now();
        trigger_changed
    }

    /// Resets run history, as required when importing a task (see
    /// `spec.md` §4.4.10): counters zeroed, `last_run_at`/`last_error`
    /// cleared, status forced to `Active`. `created_at` is preserved.
    pub fn reset_for_import(&mut self) {
        self.run_count = 0;
        self.success_count = 0;
        self.failure_count = 0;
        self.last_run_at = None;
        self.last_error = None;
        self.status = TaskStatus::Active;
        self.next_run_at = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TaskTrigger;

    fn sample_input() -> CreateTaskInput {
        CreateTaskInput {
            name: "nightly report".to_string(),
            description: None,
            tags: vec!["reporting".to_string()],
            task_type: "workflow".to_string(),
            trigger: TaskTrigger::Interval { interval_ms: 60_000 },
            payload: JsonValue::Null,
            config: TaskConfig::default(),
            notification: NotificationConfig::default(),
        }
    }

    #[test]
    fn from_input_defaults_to_active_with_zeroed_counters() {
        let task = ScheduledTask::from_input(sample_input());
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.run_count, 0);
        assert!(task.next_run_at.is_none());
    }

    #[test]
    fn apply_patch_reports_trigger_change() {
        let mut task = ScheduledTask::from_input(sample_input());
        let changed = task.apply_patch(TaskPatch {
            name: Some("renamed".to_string()),
            ..Default::default()
        });
        assert!(!changed);
        assert_eq!(task.name, "renamed");

        let changed = task.apply_patch(TaskPatch {
            trigger: Some(TaskTrigger::Interval { interval_ms: 5_000 }),
            ..Default::default()
        });
        assert!(changed);
    }

    #[test]
    fn reset_for_import_clears_history_but_keeps_created_at() {
        let mut task = ScheduledTask::from_input(sample_input());
        task.run_count = 10;
        task.success_count = 9;
        task.failure_count = 1;
        task.last_error = Some("boom".to_string());
        task.status = TaskStatus::Expired;
        let created_at = task.created_at;

        task.reset_for_import();

        assert_eq!(task.run_count, 0);
        assert_eq!(task.success_count, 0);
        assert_eq!(task.failure_count, 0);
        assert!(task.last_error.is_none());
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.created_at, created_at);
    }

    #[test]
    fn effective_max_retry_delay_defaults_to_sixty_seconds() {
        let config = TaskConfig::default();
        assert_eq!(config.effective_max_retry_delay_ms(), 60_000);
    }
}
