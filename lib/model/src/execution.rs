//! A single firing (execution) of a task.

use chrono::{DateTime, Utc};
use scheduler_core::{ExecutionId, LogEntryId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Status of a single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Currently in flight.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error (including timeout).
    Failed,
    /// Never ran because the concurrency gate rejected it.
    Skipped,
}

/// Severity of a single log line recorded against an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Debug,
    /// Normal progress information.
    Info,
    /// Recoverable anomaly.
    Warn,
    /// Failure detail.
    Error,
}

/// A single structured log line attached to an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier.
    pub id: LogEntryId,
    /// When the line was recorded.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    pub data: Option<JsonValue>,
}

impl LogEntry {
    /// Creates a new log entry stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: LogEntryId::new(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a structured payload to this entry.
    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// One firing of a task, from start to terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    /// Unique identifier.
    pub id: ExecutionId,
    /// The task this execution belongs to.
    pub task_id: TaskId,
    /// Denormalized task name, captured at start time.
    pub task_name: String,
    /// Denormalized task type, captured at start time.
    pub task_type: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// Input handed to the executor (the task's payload at fire time).
    pub input: Option<JsonValue>,
    /// Output returned by the executor on success.
    pub output: Option<JsonValue>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Zero-based retry counter; 0 is the first attempt.
    pub retry_attempt: u32,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Duration in milliseconds, set alongside `completed_at`.
    pub duration_ms: Option<i64>,
    /// Ordered log lines recorded during the execution.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TaskExecution {
    /// Creates a new `running` execution for `task_id`.
    #[must_use]
    pub fn start(
        task_id: TaskId,
        task_name: impl Into<String>,
        task_type: impl Into<String>,
        retry_attempt: u32,
        input: Option<JsonValue>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            task_id,
            task_name: task_name.into(),
            task_type: task_type.into(),
            status: ExecutionStatus::Running,
            input,
            output: None,
            error: None,
            retry_attempt,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            logs: Vec::new(),
        }
    }

    /// Appends a log line.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
    }

    /// Marks this execution completed with the given output.
    pub fn complete(&mut self, output: Option<JsonValue>) {
        let now = Utc::now();
        self.status = ExecutionStatus::Completed;
        self.output = output;
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        self.completed_at = Some(now);
    }

    /// Marks this execution failed with the given error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        self.completed_at = Some(now);
    }

    /// Marks this execution skipped by the concurrency gate. Duration is
    /// always zero per `spec.md` §4.4.5 step 1.
    #[must_use]
    pub fn skipped(task_id: TaskId, task_name: impl Into<String>, task_type: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut execution = Self {
            id: ExecutionId::new(),
            task_id,
            task_name: task_name.into(),
            task_type: task_type.into(),
            status: ExecutionStatus::Skipped,
            input: None,
            output: None,
            error: None,
            retry_attempt: 0,
            started_at: now,
            completed_at: Some(now),
            duration_ms: Some(0),
            logs: Vec::new(),
        };
        execution.log(
            LogLevel::Info,
            "Skipped: concurrent execution not allowed",
        );
        execution
    }

    /// Returns whether this execution reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, ExecutionStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_complete_sets_duration() {
        let mut execution = TaskExecution::start(TaskId::new(), "t", "workflow", 0, None);
        assert_eq!(execution.status, ExecutionStatus::Running);
        execution.complete(Some(serde_json::json!({"ok": true})));
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.duration_ms.unwrap() >= 0);
    }

    #[test]
    fn skipped_execution_has_zero_duration_and_log() {
        let execution = TaskExecution::skipped(TaskId::new(), "t", "workflow");
        assert_eq!(execution.status, ExecutionStatus::Skipped);
        assert_eq!(execution.duration_ms, Some(0));
        assert_eq!(execution.logs.len(), 1);
        assert!(execution.logs[0].message.contains("Skipped"));
    }

    #[test]
    fn fail_records_error_message() {
        let mut execution = TaskExecution::start(TaskId::new(), "t", "workflow", 1, None);
        execution.fail("boom");
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.error.as_deref(), Some("boom"));
        assert_eq!(execution.retry_attempt, 1);
    }

    #[test]
    fn is_terminal_distinguishes_running() {
        let execution = TaskExecution::start(TaskId::new(), "t", "workflow", 0, None);
        assert!(!execution.is_terminal());
        let skipped = TaskExecution::skipped(TaskId::new(), "t", "workflow");
        assert!(skipped.is_terminal());
    }
}
