//! The host-facing event entry point, per `spec.md` §4.6.

use crate::scheduler::Scheduler;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Thin wrapper a host uses to push named events into a running
/// [`Scheduler`], which dispatches to every matching `event`-triggered task.
pub struct EventBus {
    scheduler: Arc<Scheduler>,
}

impl EventBus {
    /// Binds an `EventBus` to a scheduler instance.
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Emits `event_type`, optionally scoped to `source` and carrying
    /// `data`. Internally calls `Scheduler::trigger_event_task`.
    pub async fn emit(&self, event_type: &str, data: Option<JsonValue>, source: Option<&str>) {
        self.scheduler.trigger_event_task(event_type, source, data).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::notification::{NoopLifecycleHooks, NoopNotificationSink};
    use scheduler_coordination::{InProcessExecutionBus, SoloLeaderLock};
    use scheduler_store::InMemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn emit_does_not_panic_with_no_matching_tasks() {
        let scheduler = Scheduler::new(
            Arc::new(InMemoryStore::default()),
            Arc::new(SoloLeaderLock::default()),
            Arc::new(InProcessExecutionBus::default()),
            Arc::new(NoopNotificationSink),
            Arc::new(NoopLifecycleHooks),
            SchedulerConfig::default(),
        );
        let bus = EventBus::new(scheduler);
        bus.emit("order.created", None, None).await;
    }
}
