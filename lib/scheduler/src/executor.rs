//! The executor contract and the registry that dispatches on `task.type`.

use async_trait::async_trait;
use scheduler_model::{ScheduledTask, TaskExecution};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// The result of running one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOutcome {
    pub success: bool,
    pub output: Option<JsonValue>,
    pub error: Option<String>,
}

impl ExecutorOutcome {
    /// Shorthand for a successful outcome.
    #[must_use]
    pub fn success(output: Option<JsonValue>) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// Shorthand for a failed outcome.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Something that can carry out a task's work, keyed by `task.type` in the
/// [`ExecutorRegistry`]. Per `spec.md` §6.1: executors must accept
/// cancellation, must not mutate the passed task, and must not access the
/// store directly for this task.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs one execution. `cancellation` is advisory: it is cancelled when
    /// the pipeline's timeout fires, but the pipeline returns promptly
    /// regardless of whether the executor observes it.
    async fn execute(
        &self,
        task: &ScheduledTask,
        execution: &TaskExecution,
        cancellation: CancellationToken,
    ) -> ExecutorOutcome;
}

/// Associative registry mapping `task.type` to an [`Executor`], so new
/// executors plug in without modifying the scheduler core (`spec.md` §9).
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Box<dyn Executor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the executor for `task_type`.
    pub fn register(&mut self, task_type: impl Into<String>, executor: impl Executor + 'static) {
        self.executors.insert(task_type.into(), Box::new(executor));
    }

    /// Looks up the executor registered for `task_type`.
    #[must_use]
    pub fn get(&self, task_type: &str) -> Option<&dyn Executor> {
        self.executors.get(task_type).map(AsRef::as_ref)
    }
}

/// An executor that always succeeds, echoing its payload back as output.
/// Mirrors the teacher's `EchoExecutor`/`MockExecutor` test doubles; not a
/// real integration surface.
pub struct EchoExecutor;

#[async_trait]
impl Executor for EchoExecutor {
    async fn execute(
        &self,
        task: &ScheduledTask,
        _execution: &TaskExecution,
        _cancellation: CancellationToken,
    ) -> ExecutorOutcome {
        ExecutorOutcome::success(Some(task.payload.clone()))
    }
}

/// An executor that always fails with a fixed message, for retry/backoff
/// tests.
pub struct FailingExecutor {
    pub message: String,
}

#[async_trait]
impl Executor for FailingExecutor {
    async fn execute(
        &self,
        _task: &ScheduledTask,
        _execution: &TaskExecution,
        _cancellation: CancellationToken,
    ) -> ExecutorOutcome {
        ExecutorOutcome::failure(self.message.clone())
    }
}

/// An executor that sleeps before succeeding, for concurrency-gate and
/// timeout tests.
pub struct SleepingExecutor {
    pub duration: std::time::Duration,
}

#[async_trait]
impl Executor for SleepingExecutor {
    async fn execute(
        &self,
        task: &ScheduledTask,
        _execution: &TaskExecution,
        cancellation: CancellationToken,
    ) -> ExecutorOutcome {
        tokio::select! {
            () = tokio::time::sleep(self.duration) => ExecutorOutcome::success(Some(task.payload.clone())),
            () = cancellation.cancelled() => ExecutorOutcome::failure("cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_model::{CreateTaskInput, NotificationConfig, TaskConfig, TaskTrigger};

    fn sample_task() -> ScheduledTask {
        ScheduledTask::from_input(CreateTaskInput {
            name: "t".to_string(),
            description: None,
            tags: vec![],
            task_type: "workflow".to_string(),
            trigger: TaskTrigger::Interval { interval_ms: 1_000 },
            payload: serde_json::json!({"n": 1}),
            config: TaskConfig::default(),
            notification: NotificationConfig::default(),
        })
    }

    #[tokio::test]
    async fn registry_dispatches_by_task_type() {
        let mut registry = ExecutorRegistry::new();
        registry.register("workflow", EchoExecutor);
        assert!(registry.get("workflow").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn echo_executor_returns_payload() {
        let task = sample_task();
        let execution = TaskExecution::start(task.id, "t", "workflow", 0, Some(task.payload.clone()));
        let outcome = EchoExecutor
            .execute(&task, &execution, CancellationToken::new())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.output, Some(serde_json::json!({"n": 1})));
    }
}
