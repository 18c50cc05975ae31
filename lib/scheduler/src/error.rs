//! The scheduler's closed error-discriminator set, per `spec.md` §7.

use std::fmt;

/// Errors raised by `Scheduler` operations.
#[derive(Debug)]
pub enum SchedulerError {
    /// `initialize()` failed; store errors during init are fatal.
    InitFailed { reason: String },
    /// The requested task id does not exist.
    TaskNotFound { id: String },
    /// No executor is registered for the task's `task_type`.
    ExecutorNotFound { task_type: String },
    /// The executor did not return within `config.timeout_ms`.
    ExecutionTimeout { task_id: String },
    /// The executor returned `{success: false}` or raised an error.
    ExecutionFailed { reason: String },
    /// The concurrency gate rejected a fire because one was already running.
    ConcurrentExecution { task_id: String },
    /// The task's cron expression failed to parse or validate.
    InvalidCron { reason: String },
    /// The task's trigger configuration is otherwise invalid.
    InvalidTrigger { reason: String },
    /// The store returned an error during normal (post-init) operation.
    DbError { reason: String },
    /// A `NotificationSink` call failed. Never fails an execution; logged.
    NotificationFailed { reason: String },
    /// A webhook notification transport failed.
    WebhookFailed { reason: String },
    /// A custom executor's input failed validation before it ran.
    ScriptValidationFailed { reason: String },
    /// A plugin/custom executor's handler was not found in its own registry.
    PluginHandlerNotFound { name: String },
    /// Anything not covered by the above.
    Unknown { reason: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed { reason } => write!(f, "initialization failed: {reason}"),
            Self::TaskNotFound { id } => write!(f, "task not found: {id}"),
            Self::ExecutorNotFound { task_type } => write!(f, "no executor registered for type: {task_type}"),
            Self::ExecutionTimeout { task_id } => write!(f, "execution of task {task_id} timed out"),
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::ConcurrentExecution { task_id } => {
                write!(f, "concurrent execution rejected for task {task_id}")
            }
            Self::InvalidCron { reason } => write!(f, "invalid cron expression: {reason}"),
            Self::InvalidTrigger { reason } => write!(f, "invalid trigger: {reason}"),
            Self::DbError { reason } => write!(f, "database error: {reason}"),
            Self::NotificationFailed { reason } => write!(f, "notification failed: {reason}"),
            Self::WebhookFailed { reason } => write!(f, "webhook failed: {reason}"),
            Self::ScriptValidationFailed { reason } => write!(f, "script validation failed: {reason}"),
            Self::PluginHandlerNotFound { name } => write!(f, "plugin handler not found: {name}"),
            Self::Unknown { reason } => write!(f, "unknown error: {reason}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<scheduler_store::StoreError> for SchedulerError {
    fn from(err: scheduler_store::StoreError) -> Self {
        Self::DbError {
            reason: err.to_string(),
        }
    }
}

impl From<scheduler_cron::CronError> for SchedulerError {
    fn from(err: scheduler_cron::CronError) -> Self {
        Self::InvalidCron {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = SchedulerError::ExecutorNotFound {
            task_type: "workflow".to_string(),
        };
        assert!(err.to_string().contains("workflow"));
    }
}
