//! Notification and lifecycle-hook plugging points, per `spec.md` §6.2/§6.3.

use async_trait::async_trait;
use scheduler_model::{ScheduledTask, TaskExecution};

/// The event a [`NotificationSink`] is being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    Start,
    Progress,
    Complete,
    Error,
}

/// A host-implemented transport for task notifications. Channel selection,
/// templating, and delivery belong entirely to the implementation; the
/// engine only decides *when* to call `notify` and tolerates its errors.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Notifies about `event` for `execution` of `task`. Errors are logged
    /// at `warn` and never fail the execution.
    async fn notify(
        &self,
        task: &ScheduledTask,
        execution: &TaskExecution,
        event: NotificationEvent,
    ) -> Result<(), String>;
}

/// A sink that notifies no one. The default when a host doesn't need
/// notifications.
#[derive(Default)]
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn notify(
        &self,
        _task: &ScheduledTask,
        _execution: &TaskExecution,
        _event: NotificationEvent,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Lifecycle hooks dispatched at the same points a [`NotificationSink`] is
/// consulted, per `spec.md` §6.2. Errors inside hooks are swallowed.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Called after a `running` execution record is persisted.
    async fn on_scheduled_task_start(&self, task: &ScheduledTask, execution: &TaskExecution);

    /// Called after a successful completion is persisted.
    async fn on_scheduled_task_complete(&self, task: &ScheduledTask, execution: &TaskExecution);

    /// Called after a failure (from the executor or a timeout) is persisted.
    async fn on_scheduled_task_error(&self, task: &ScheduledTask, execution: &TaskExecution, error: &str);
}

/// Hooks that do nothing. The default when a host doesn't need them.
#[derive(Default)]
pub struct NoopLifecycleHooks;

#[async_trait]
impl LifecycleHooks for NoopLifecycleHooks {
    async fn on_scheduled_task_start(&self, _task: &ScheduledTask, _execution: &TaskExecution) {}

    async fn on_scheduled_task_complete(&self, _task: &ScheduledTask, _execution: &TaskExecution) {}

    async fn on_scheduled_task_error(&self, _task: &ScheduledTask, _execution: &TaskExecution, _error: &str) {}
}
