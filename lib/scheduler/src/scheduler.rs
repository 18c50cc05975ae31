//! The scheduler itself: timers, the execution pipeline, retry/backoff,
//! dependency chaining, and the create/update/delete/import/export surface.
//! Implements `spec.md` §4.4 exactly.

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::executor::ExecutorRegistry;
use crate::notification::{LifecycleHooks, NotificationEvent, NotificationSink};
use chrono::{DateTime, Utc};
use rand::Rng;
use scheduler_coordination::{ExecutionBus, ExecutionStatusEvent, LeaderLock};
use scheduler_core::{ExecutionId, TaskId};
use scheduler_cron::CronSchedule;
use scheduler_model::{
    CreateTaskInput, ExecutionStatus, ExportEnvelope, ImportMode, ImportReport, LogLevel,
    ScheduledTask, TaskExecution, TaskPatch, TaskStatus, TaskTrigger, CURRENT_EXPORT_VERSION,
};
use scheduler_store::Store;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Entity types that map to a structured `<type>:completed` event on
/// success; everything else maps to `custom`. The asymmetry is hard-coded
/// per `spec.md` §4.4.5 step 8 / §9, preserved as-is.
const STRUCTURED_EVENT_TYPES: [&str; 4] = ["workflow", "agent", "backup", "sync"];

/// Pure next-fire computation, per `spec.md` §4.4.2.
#[must_use]
pub fn compute_next_run(
    trigger: &TaskTrigger,
    last_run_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match trigger {
        TaskTrigger::Cron { expression, timezone } => {
            CronSchedule::parse(expression, timezone.as_deref())
                .ok()
                .and_then(|schedule| schedule.next_fire(now))
        }
        TaskTrigger::Interval { interval_ms } => {
            let base = last_run_at.unwrap_or(created_at);
            let next = base + chrono::Duration::milliseconds(*interval_ms);
            if next <= now {
                Some(now + chrono::Duration::milliseconds(*interval_ms))
            } else {
                Some(next)
            }
        }
        TaskTrigger::Once { run_at } => (*run_at > now).then_some(*run_at),
        TaskTrigger::Event { .. } => None,
    }
}

/// Static cycle check over the full dependency graph, run once at
/// create/update time. Complements (does not replace) the runtime guarded
/// visited set used while a dependency chain is actually firing.
fn has_dependency_cycle(tasks: &[ScheduledTask]) -> bool {
    let mut graph = petgraph::graph::DiGraph::<TaskId, ()>::new();
    let mut nodes: HashMap<TaskId, petgraph::graph::NodeIndex> = HashMap::new();
    for task in tasks {
        nodes.entry(task.id).or_insert_with(|| graph.add_node(task.id));
    }
    for task in tasks {
        for dependency_id in task.trigger.depends_on() {
            let to = *nodes.entry(task.id).or_insert_with(|| graph.add_node(task.id));
            let from = *nodes.entry(*dependency_id).or_insert_with(|| graph.add_node(*dependency_id));
            graph.add_edge(from, to, ());
        }
    }
    petgraph::algo::is_cyclic_directed(&graph)
}

/// Removes `id` from a visited set on drop, so a dependency chain always
/// releases its guard even if a step along the way returns early.
struct VisitedGuard<'a> {
    visited: &'a Mutex<HashSet<TaskId>>,
    id: TaskId,
}

impl Drop for VisitedGuard<'_> {
    fn drop(&mut self) {
        self.visited.lock().expect("visited set mutex poisoned").remove(&self.id);
    }
}

/// The scheduler. Construct with [`Scheduler::new`], which returns an `Arc`
/// since timers and sweeps hold a clone of it across spawned tasks.
pub struct Scheduler {
    store: Arc<dyn Store>,
    leader_lock: Arc<dyn LeaderLock>,
    execution_bus: Arc<dyn ExecutionBus>,
    notification_sink: Arc<dyn NotificationSink>,
    hooks: Arc<dyn LifecycleHooks>,
    executors: RwLock<ExecutorRegistry>,
    config: SchedulerConfig,

    timers: Mutex<HashMap<TaskId, JoinHandle<()>>>,
    running_executions: Mutex<HashMap<TaskId, ExecutionId>>,
    dependency_chain_visited: Mutex<HashSet<TaskId>>,

    leader_watch_task: Mutex<Option<JoinHandle<()>>>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    retention_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Scheduler {
    /// Assembles a scheduler from its dependencies. Does not start anything;
    /// call [`Scheduler::initialize`] for that.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        leader_lock: Arc<dyn LeaderLock>,
        execution_bus: Arc<dyn ExecutionBus>,
        notification_sink: Arc<dyn NotificationSink>,
        hooks: Arc<dyn LifecycleHooks>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            leader_lock,
            execution_bus,
            notification_sink,
            hooks,
            executors: RwLock::new(ExecutorRegistry::new()),
            config,
            timers: Mutex::new(HashMap::new()),
            running_executions: Mutex::new(HashMap::new()),
            dependency_chain_visited: Mutex::new(HashSet::new()),
            leader_watch_task: Mutex::new(None),
            sweep_task: Mutex::new(None),
            retention_task: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    /// Registers an executor for `task_type`. Safe to call before or after
    /// `initialize()`.
    pub async fn register_executor(&self, task_type: impl Into<String>, executor: impl crate::executor::Executor + 'static) {
        self.executors.write().await.register(task_type, executor);
    }

    /// Whether this instance currently holds the leader lock.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.leader_lock.is_leader()
    }

    // ---- 4.4.1 Lifecycle -------------------------------------------------

    /// Idempotent. Starts leader election, the missed-task sweep, and
    /// retention, and schedules every active task if already leader.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.leader_lock.start().await.map_err(|err| SchedulerError::InitFailed {
            reason: err.to_string(),
        })?;

        if let Err(err) = self.store.cleanup_old_executions(self.config.retention_max_age_days).await {
            tracing::error!(error = %err, "initial retention cleanup failed");
        }

        if self.leader_lock.is_leader() {
            self.schedule_all_active().await;
        }

        let mut leader_rx = self.leader_lock.subscribe();
        let watched = Arc::clone(self);
        let leader_watch = tokio::spawn(async move {
            loop {
                if leader_rx.changed().await.is_err() {
                    break;
                }
                let leading = *leader_rx.borrow();
                if leading {
                    watched.schedule_all_active().await;
                } else {
                    watched.cancel_all_timers();
                }
            }
        });
        *self.leader_watch_task.lock().expect("mutex poisoned") = Some(leader_watch);

        let sweeping = Arc::clone(self);
        let sweep_period = Duration::from_secs(self.config.sweep_interval_secs);
        let sweep_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_period);
            loop {
                ticker.tick().await;
                sweeping.run_missed_sweep().await;
            }
        });
        *self.sweep_task.lock().expect("mutex poisoned") = Some(sweep_task);

        let retaining = Arc::clone(self);
        let retention_period = Duration::from_secs(self.config.retention_interval_secs);
        let retention_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(retention_period);
            ticker.tick().await; // initial cleanup already ran above; skip the immediate fire
            loop {
                ticker.tick().await;
                if let Err(err) = retaining.store.cleanup_old_executions(retaining.config.retention_max_age_days).await {
                    tracing::error!(error = %err, "periodic retention cleanup failed");
                }
            }
        });
        *self.retention_task.lock().expect("mutex poisoned") = Some(retention_task);

        Ok(())
    }

    /// Cancels timers, stops the sweep/retention/leader-watch tasks,
    /// releases the leader lock. `initialize()` may be called again after.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel_all_timers();
        if let Some(handle) = self.sweep_task.lock().expect("mutex poisoned").take() {
            handle.abort();
        }
        if let Some(handle) = self.retention_task.lock().expect("mutex poisoned").take() {
            handle.abort();
        }
        if let Some(handle) = self.leader_watch_task.lock().expect("mutex poisoned").take() {
            handle.abort();
        }
        if let Err(err) = self.leader_lock.stop().await {
            tracing::warn!(error = %err, "leader lock stop failed");
        }
    }

    fn cancel_timer(&self, task_id: TaskId) {
        if let Some(handle) = self.timers.lock().expect("mutex poisoned").remove(&task_id) {
            handle.abort();
        }
    }

    fn cancel_all_timers(&self) {
        let mut timers = self.timers.lock().expect("mutex poisoned");
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    async fn schedule_all_active(self: &Arc<Self>) {
        match self.store.get_tasks_by_status(TaskStatus::Active).await {
            Ok(tasks) => {
                for task in tasks {
                    self.schedule_task(&task);
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load active tasks for scheduling");
            }
        }
    }

    // ---- 4.4.3 Timer management and drift resistance ---------------------

    /// Leader-only: arms (or re-arms) the timer for `task`, per the
    /// drift-resistant strategy in `spec.md` §4.4.3.
    fn schedule_task(self: &Arc<Self>, task: &ScheduledTask) {
        self.cancel_timer(task.id);
        if !self.leader_lock.is_leader() {
            return;
        }
        let Some(fire_at) = task.next_run_at else {
            return;
        };

        let scheduler = Arc::clone(self);
        let task_id = task.id;
        let handle = tokio::spawn(async move {
            loop {
                let remaining_ms = (fire_at - Utc::now()).num_milliseconds();
                if remaining_ms <= 0 {
                    break;
                }
                if remaining_ms > 60_000 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    continue;
                }
                tokio::time::sleep(Duration::from_millis(remaining_ms as u64)).await;
                break;
            }
            scheduler.fire(task_id).await;
        });
        self.timers.lock().expect("mutex poisoned").insert(task.id, handle);
    }

    async fn fire(self: &Arc<Self>, task_id: TaskId) {
        self.timers.lock().expect("mutex poisoned").remove(&task_id);
        if !self.leader_lock.is_leader() {
            return;
        }
        let task = match self.store.get_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(task_id = %task_id, error = %err, "failed to load task for firing");
                return;
            }
        };
        if task.status != TaskStatus::Active {
            return;
        }
        self.run_pipeline(task, 0).await;
    }

    // ---- 4.4.4 / 4.4.6 Missed-task sweep ----------------------------------

    /// Runs once per minute and on every hidden-to-visible transition.
    /// Leader-only.
    pub async fn run_missed_sweep(self: &Arc<Self>) {
        if !self.leader_lock.is_leader() {
            return;
        }
        let now = Utc::now();
        let tasks = match self.store.get_tasks_by_status(TaskStatus::Active).await {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!(error = %err, "missed-task sweep failed to load tasks");
                return;
            }
        };

        for mut task in tasks {
            let Some(next_run_at) = task.next_run_at else {
                continue;
            };
            if next_run_at >= now {
                continue;
            }

            let slipped = now - next_run_at;
            if slipped < chrono::Duration::seconds(60) && task.config.run_missed_on_startup {
                self.run_pipeline(task, 0).await;
            } else {
                task.next_run_at = compute_next_run(&task.trigger, task.last_run_at, task.created_at, now);
                task.updated_at = now;
                if let Err(err) = self.store.update_task(&task).await {
                    tracing::error!(task_id = %task.id, error = %err, "failed to persist recomputed next_run_at");
                    continue;
                }
                self.schedule_task(&task);
            }
        }
    }

    /// Host-called hook for process-visibility transitions. A transition to
    /// visible triggers an immediate sweep.
    pub async fn on_visibility_change(self: &Arc<Self>, visible: bool) {
        if visible {
            self.run_missed_sweep().await;
        }
    }

    // ---- 4.4.5 Execution pipeline ------------------------------------------

    async fn run_pipeline(self: &Arc<Self>, task: ScheduledTask, retry_attempt: u32) -> TaskExecution {
        // Step 1: concurrency gate.
        if !task.config.allow_concurrent {
            let already_running = self.running_executions.lock().expect("mutex poisoned").contains_key(&task.id);
            if already_running {
                let execution = TaskExecution::skipped(task.id, &task.name, &task.task_type);
                if let Err(err) = self.store.create_execution(&execution).await {
                    tracing::error!(task_id = %task.id, error = %err, "failed to persist skipped execution");
                }
                self.publish_status(&task, &execution).await;

                let mut skipped_task = task.clone();
                skipped_task.run_count += 1;
                skipped_task.last_run_at = Some(execution.started_at);
                skipped_task.updated_at = Utc::now();
                if let Err(err) = self.store.update_task(&skipped_task).await {
                    tracing::error!(task_id = %task.id, error = %err, "failed to persist task after skip");
                }

                return execution;
            }
        }

        // Step 2: create running record.
        let mut execution = TaskExecution::start(
            task.id,
            &task.name,
            &task.task_type,
            retry_attempt,
            Some(task.payload.clone()),
        );
        if let Err(err) = self.store.create_execution(&execution).await {
            tracing::error!(task_id = %task.id, error = %err, "failed to persist running execution");
            return execution;
        }
        self.running_executions.lock().expect("mutex poisoned").insert(task.id, execution.id);
        self.publish_status(&task, &execution).await;
        if task.notification.on_start {
            if let Err(err) = self.notification_sink.notify(&task, &execution, NotificationEvent::Start).await {
                tracing::warn!(task_id = %task.id, error = %err, "start notification failed");
            }
        }
        self.hooks.on_scheduled_task_start(&task, &execution).await;

        // Step 3: resolve executor.
        let outcome = {
            let registry = self.executors.read().await;
            match registry.get(&task.task_type) {
                Some(executor) => {
                    // Step 4: run with timeout and an advisory cancellation token.
                    let cancellation = tokio_util::sync::CancellationToken::new();
                    let timeout = Duration::from_millis(task.config.timeout_ms.max(0) as u64);
                    let run = executor.execute(&task, &execution, cancellation.clone());
                    match tokio::time::timeout(timeout, run).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            cancellation.cancel();
                            crate::executor::ExecutorOutcome::failure("execution timed out")
                        }
                    }
                }
                None => crate::executor::ExecutorOutcome::failure(format!(
                    "no executor registered for type: {}",
                    task.task_type
                )),
            }
        };

        // Step 5: map the result.
        let succeeded = outcome.success;
        if succeeded {
            execution.complete(outcome.output.clone());
        } else {
            execution.fail(outcome.error.clone().unwrap_or_else(|| "unknown executor error".to_string()));
        }

        // Step 6: statistics update.
        let now = Utc::now();
        let mut updated_task = task.clone();
        updated_task.run_count += 1;
        updated_task.last_run_at = Some(execution.started_at);
        updated_task.updated_at = now;
        if succeeded {
            updated_task.success_count += 1;
            updated_task.last_error = None;
        } else {
            updated_task.failure_count += 1;
            updated_task.last_error = execution.error.clone();
        }

        // Step 7: notifications and hooks.
        if succeeded {
            if task.notification.on_complete {
                if let Err(err) = self.notification_sink.notify(&task, &execution, NotificationEvent::Complete).await {
                    tracing::warn!(task_id = %task.id, error = %err, "complete notification failed");
                }
            }
            self.hooks.on_scheduled_task_complete(&task, &execution).await;
        } else {
            let message = execution.error.clone().unwrap_or_default();
            if task.notification.on_error {
                if let Err(err) = self.notification_sink.notify(&task, &execution, NotificationEvent::Error).await {
                    tracing::warn!(task_id = %task.id, error = %err, "error notification failed");
                }
            }
            self.hooks.on_scheduled_task_error(&task, &execution, &message).await;
        }

        // Step 8: event emission on success.
        if succeeded {
            self.emit_completion_event(&updated_task, &execution);
        }

        // Step 9: retry on failure.
        if !succeeded && retry_attempt < updated_task.config.max_retries {
            let base = updated_task.config.retry_delay_ms as f64;
            let exponential = base * 2f64.powi(retry_attempt as i32);
            let jitter = rand::thread_rng().gen_range(0.0..0.25) * base;
            let cap = updated_task.config.effective_max_retry_delay_ms() as f64;
            let delay_ms = (exponential + jitter).min(cap).max(0.0) as u64;
            execution.log(
                LogLevel::Info,
                format!("Retrying attempt {} after {delay_ms}ms", retry_attempt + 1),
            );

            let scheduler = Arc::clone(self);
            let retry_task = updated_task.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                scheduler.run_pipeline(retry_task, retry_attempt + 1).await;
            });
        }

        // Step 10: finalize.
        self.running_executions.lock().expect("mutex poisoned").remove(&task.id);
        if let Err(err) = self.store.update_execution(&execution).await {
            tracing::error!(task_id = %task.id, error = %err, "failed to persist final execution");
        }
        self.publish_status(&updated_task, &execution).await;

        updated_task.next_run_at = compute_next_run(
            &updated_task.trigger,
            updated_task.last_run_at,
            updated_task.created_at,
            Utc::now(),
        );
        if matches!(updated_task.trigger, TaskTrigger::Once { .. }) && updated_task.next_run_at.is_none() {
            updated_task.status = TaskStatus::Expired;
        }
        if let Err(err) = self.store.update_task(&updated_task).await {
            tracing::error!(task_id = %task.id, error = %err, "failed to persist task after execution");
        }
        if updated_task.status == TaskStatus::Active {
            self.schedule_task(&updated_task);
        }

        // Step 11: dependency trigger on success only.
        if succeeded {
            self.trigger_dependent_tasks(updated_task.id).await;
        }

        execution
    }

    async fn publish_status(&self, task: &ScheduledTask, execution: &TaskExecution) {
        let event = ExecutionStatusEvent {
            task_id: task.id,
            execution_id: execution.id,
            status: execution.status,
            task_name: task.name.clone(),
            duration_ms: execution.duration_ms,
            error: execution.error.clone(),
        };
        if let Err(err) = self.execution_bus.publish(event).await {
            tracing::warn!(task_id = %task.id, error = %err, "execution bus publish failed");
        }
    }

    fn emit_completion_event(self: &Arc<Self>, task: &ScheduledTask, execution: &TaskExecution) {
        let (event_type, source) = if STRUCTURED_EVENT_TYPES.contains(&task.task_type.as_str()) {
            (format!("{}:completed", task.task_type), None)
        } else {
            ("custom".to_string(), Some(task.task_type.clone()))
        };
        tracing::debug!(
            task_id = %task.id,
            execution_id = %execution.id,
            event_type = %event_type,
            source = ?source,
            "emitting scheduler event"
        );

        let scheduler = Arc::clone(self);
        let payload = execution.output.clone();
        tokio::spawn(async move {
            scheduler.trigger_event_task(&event_type, source.as_deref(), payload).await;
        });
    }

    // ---- 4.4.7 Dependency chaining with cycle detection -------------------

    async fn trigger_dependent_tasks(self: &Arc<Self>, completed_task_id: TaskId) {
        {
            let mut visited = self.dependency_chain_visited.lock().expect("mutex poisoned");
            if visited.contains(&completed_task_id) {
                tracing::warn!(task_id = %completed_task_id, "dependency cycle detected; aborting chain");
                return;
            }
            visited.insert(completed_task_id);
        }
        let _guard = VisitedGuard {
            visited: &self.dependency_chain_visited,
            id: completed_task_id,
        };

        let candidates = match self.store.get_all_tasks().await {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!(error = %err, "failed to load tasks for dependency chaining");
                return;
            }
        };

        for candidate in candidates {
            if candidate.status != TaskStatus::Active {
                continue;
            }
            let depends_on = candidate.trigger.depends_on();
            if !depends_on.contains(&completed_task_id) {
                continue;
            }

            let mut all_satisfied = true;
            for dependency_id in depends_on {
                match self.store.get_task_executions(*dependency_id, 1, None).await {
                    Ok(executions) => {
                        let satisfied = executions
                            .first()
                            .is_some_and(|execution| execution.status == ExecutionStatus::Completed);
                        if !satisfied {
                            all_satisfied = false;
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::error!(task_id = %dependency_id, error = %err, "failed to load dependency executions");
                        all_satisfied = false;
                        break;
                    }
                }
            }

            if all_satisfied {
                self.run_pipeline(candidate, 0).await;
            }
        }
    }

    // ---- 4.4.8 Event triggering --------------------------------------------

    /// `triggerEventTask(eventType, eventSource?, payload?)` from `spec.md`
    /// §4.4.8.
    pub async fn trigger_event_task(
        self: &Arc<Self>,
        event_type: &str,
        event_source: Option<&str>,
        payload: Option<JsonValue>,
    ) {
        let tasks = match self.store.get_active_event_tasks(Some(event_type)).await {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!(event_type, error = %err, "failed to load event tasks");
                return;
            }
        };

        for task in tasks {
            let TaskTrigger::Event { event_source: expected_source, .. } = &task.trigger else {
                continue;
            };
            if let Some(expected) = expected_source {
                if Some(expected.as_str()) != event_source {
                    continue;
                }
            }

            let mut merged = task.clone();
            let event_payload = serde_json::json!({
                "event": {
                    "type": event_type,
                    "source": event_source,
                    "data": payload,
                }
            });
            if let (JsonValue::Object(base), JsonValue::Object(extra)) = (&mut merged.payload, event_payload) {
                for (key, value) in extra {
                    base.insert(key, value);
                }
            } else {
                merged.payload = event_payload;
            }

            self.run_pipeline(merged, 0).await;
        }
    }

    async fn reject_if_cyclic(&self, candidate: &ScheduledTask) -> Result<(), SchedulerError> {
        let mut tasks = self.store.get_all_tasks().await?;
        tasks.retain(|task| task.id != candidate.id);
        tasks.push(candidate.clone());
        if has_dependency_cycle(&tasks) {
            return Err(SchedulerError::InvalidTrigger {
                reason: "dependency graph contains a cycle".to_string(),
            });
        }
        Ok(())
    }

    // ---- 4.4.9 Create/update/delete/pause/resume/run-now surface -----------

    /// Creates a task, computes its `next_run_at`, persists it, and
    /// schedules it if active and this instance is leader.
    pub async fn create_task(self: &Arc<Self>, input: CreateTaskInput) -> Result<ScheduledTask, SchedulerError> {
        let mut task = ScheduledTask::from_input(input);
        if !task.trigger.depends_on().is_empty() {
            self.reject_if_cyclic(&task).await?;
        }
        task.next_run_at = compute_next_run(&task.trigger, task.last_run_at, task.created_at, Utc::now());
        self.store.create_task(&task).await?;
        if task.status == TaskStatus::Active {
            self.schedule_task(&task);
        }
        Ok(task)
    }

    /// Applies a patch; recomputes `next_run_at` if the trigger changed;
    /// reschedules if active.
    pub async fn update_task(self: &Arc<Self>, id: TaskId, patch: TaskPatch) -> Result<ScheduledTask, SchedulerError> {
        let mut task = self
            .store
            .get_task(id)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })?;
        let trigger_changed = task.apply_patch(patch);
        if trigger_changed {
            if !task.trigger.depends_on().is_empty() {
                self.reject_if_cyclic(&task).await?;
            }
            task.next_run_at = compute_next_run(&task.trigger, task.last_run_at, task.created_at, Utc::now());
        }
        self.store.update_task(&task).await?;
        self.cancel_timer(task.id);
        if task.status == TaskStatus::Active {
            self.schedule_task(&task);
        }
        Ok(task)
    }

    /// Cancels the timer and deletes a task transactionally with its
    /// executions.
    pub async fn delete_task(&self, id: TaskId) -> Result<bool, SchedulerError> {
        self.cancel_timer(id);
        Ok(self.store.delete_task(id).await?)
    }

    /// `active -> paused`.
    pub async fn pause_task(&self, id: TaskId) -> Result<ScheduledTask, SchedulerError> {
        let mut task = self
            .store
            .get_task(id)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })?;
        task.status = TaskStatus::Paused;
        task.updated_at = Utc::now();
        self.store.update_task(&task).await?;
        self.cancel_timer(id);
        Ok(task)
    }

    /// `paused -> active`, recomputing `next_run_at` and scheduling.
    pub async fn resume_task(self: &Arc<Self>, id: TaskId) -> Result<ScheduledTask, SchedulerError> {
        let mut task = self
            .store
            .get_task(id)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })?;
        if task.status != TaskStatus::Paused {
            return Ok(task);
        }
        task.status = TaskStatus::Active;
        task.next_run_at = compute_next_run(&task.trigger, task.last_run_at, task.created_at, Utc::now());
        task.updated_at = Utc::now();
        self.store.update_task(&task).await?;
        self.schedule_task(&task);
        Ok(task)
    }

    /// Executes a task immediately, honoring `allow_concurrent` exactly as
    /// scheduled fires do (`spec.md` §4.4.9 notes this is intentional).
    pub async fn run_task_now(self: &Arc<Self>, id: TaskId) -> Result<TaskExecution, SchedulerError> {
        let task = self
            .store
            .get_task(id)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })?;
        Ok(self.run_pipeline(task, 0).await)
    }

    // ---- 4.4.10 Import / export --------------------------------------------

    /// `{version, exportedAt, tasks}`, excluding execution history.
    pub async fn export_tasks(&self, ids: Option<&[TaskId]>) -> Result<ExportEnvelope, SchedulerError> {
        let all = self.store.get_all_tasks().await?;
        let tasks = match ids {
            Some(ids) => all.into_iter().filter(|task| ids.contains(&task.id)).collect(),
            None => all,
        };
        Ok(ExportEnvelope {
            version: CURRENT_EXPORT_VERSION,
            exported_at: Utc::now(),
            tasks,
        })
    }

    /// Validates the envelope version, applies merge/replace semantics, and
    /// resets imported tasks' run history per `spec.md` §4.4.10.
    pub async fn import_tasks(self: &Arc<Self>, envelope: ExportEnvelope, mode: ImportMode) -> Result<ImportReport, SchedulerError> {
        let mut report = ImportReport::default();
        if envelope.version != CURRENT_EXPORT_VERSION {
            report.errors.push(format!("unsupported envelope version: {}", envelope.version));
            return Ok(report);
        }

        if mode == ImportMode::Replace {
            if let Ok(existing) = self.store.get_all_tasks().await {
                for task in existing {
                    self.cancel_timer(task.id);
                    if let Err(err) = self.store.delete_task(task.id).await {
                        report.errors.push(format!("failed to delete existing task {}: {err}", task.id));
                    }
                }
            }
        }

        for mut task in envelope.tasks {
            if task.name.trim().is_empty() || task.task_type.trim().is_empty() {
                report.errors.push(format!("task {} missing required fields", task.id));
                continue;
            }

            if mode == ImportMode::Merge {
                match self.store.get_task(task.id).await {
                    Ok(Some(_)) => {
                        report.skipped += 1;
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        report.errors.push(format!("failed to check existing task {}: {err}", task.id));
                        continue;
                    }
                }
            }

            task.reset_for_import();
            task.next_run_at = compute_next_run(&task.trigger, task.last_run_at, task.created_at, Utc::now());

            match self.store.create_task(&task).await {
                Ok(()) => {
                    report.imported += 1;
                    self.schedule_task(&task);
                }
                Err(err) => {
                    report.errors.push(format!("failed to import task {}: {err}", task.id));
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{EchoExecutor, FailingExecutor, SleepingExecutor};
    use crate::notification::{NoopLifecycleHooks, NoopNotificationSink};
    use scheduler_coordination::{InProcessExecutionBus, SoloLeaderLock};
    use scheduler_model::{NotificationConfig, TaskConfig};
    use scheduler_store::InMemoryStore;
    use std::time::Duration as StdDuration;

    struct Harness {
        scheduler: Arc<Scheduler>,
        store: Arc<InMemoryStore>,
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::default());
        let scheduler = Scheduler::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(SoloLeaderLock::default()),
            Arc::new(InProcessExecutionBus::default()),
            Arc::new(NoopNotificationSink),
            Arc::new(NoopLifecycleHooks),
            SchedulerConfig::default(),
        );
        Harness { scheduler, store }
    }

    fn input(task_type: &str, trigger: TaskTrigger, config: TaskConfig) -> CreateTaskInput {
        CreateTaskInput {
            name: format!("{task_type}-task"),
            description: None,
            tags: vec![],
            task_type: task_type.to_string(),
            trigger,
            payload: serde_json::json!({}),
            config,
            notification: NotificationConfig::default(),
        }
    }

    #[tokio::test]
    async fn concurrency_gate_skips_second_concurrent_fire() {
        let h = harness().await;
        h.scheduler
            .register_executor(
                "slow",
                SleepingExecutor {
                    duration: StdDuration::from_millis(150),
                },
            )
            .await;
        let mut config = TaskConfig::default();
        config.allow_concurrent = false;
        let task = h
            .scheduler
            .create_task(input("slow", TaskTrigger::Interval { interval_ms: 60_000 }, config))
            .await
            .unwrap();
        let id = task.id;

        let s1 = Arc::clone(&h.scheduler);
        let s2 = Arc::clone(&h.scheduler);
        let _ = tokio::join!(
            async move { s1.run_task_now(id).await },
            async move {
                tokio::time::sleep(StdDuration::from_millis(20)).await;
                s2.run_task_now(id).await
            }
        );

        let executions = h.store.get_task_executions(id, 10, None).await.unwrap();
        assert!(executions.iter().any(|e| e.status == ExecutionStatus::Skipped));
        assert!(executions.iter().any(|e| e.status == ExecutionStatus::Completed));

        let reloaded = h.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(reloaded.run_count, 2);
        assert_eq!(reloaded.success_count, 1);
        assert_eq!(reloaded.failure_count, 0);
    }

    #[tokio::test]
    async fn retry_backoff_is_bounded_by_max_retry_delay() {
        let h = harness().await;
        h.scheduler
            .register_executor("failing", FailingExecutor { message: "boom".to_string() })
            .await;
        let mut config = TaskConfig::default();
        config.max_retries = 1;
        config.retry_delay_ms = 10;
        config.max_retry_delay_ms = Some(20);
        let task = h
            .scheduler
            .create_task(input("failing", TaskTrigger::Interval { interval_ms: 60_000 }, config))
            .await
            .unwrap();

        h.scheduler.run_task_now(task.id).await.unwrap();
        // Give the spawned retry time to run and persist.
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        let executions = h.store.get_task_executions(task.id, 10, None).await.unwrap();
        assert!(executions.iter().any(|e| e.retry_attempt == 1));
    }

    #[tokio::test]
    async fn dependency_chain_fires_after_all_dependencies_complete() {
        let h = harness().await;
        h.scheduler.register_executor("workflow", EchoExecutor).await;

        let upstream = h
            .scheduler
            .create_task(input(
                "workflow",
                TaskTrigger::Once { run_at: Utc::now() + chrono::Duration::hours(1) },
                TaskConfig::default(),
            ))
            .await
            .unwrap();

        let downstream = h
            .scheduler
            .create_task(input(
                "workflow",
                TaskTrigger::Event {
                    event_type: "never".to_string(),
                    event_source: None,
                    depends_on: vec![upstream.id],
                },
                TaskConfig::default(),
            ))
            .await
            .unwrap();

        h.scheduler.run_task_now(upstream.id).await.unwrap();

        let downstream_executions = h.store.get_task_executions(downstream.id, 10, None).await.unwrap();
        assert_eq!(downstream_executions.len(), 1);
        assert_eq!(downstream_executions[0].status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn cyclic_dependency_is_rejected_at_create_time() {
        let h = harness().await;
        h.scheduler.register_executor("workflow", EchoExecutor).await;

        let a = h
            .scheduler
            .create_task(input(
                "workflow",
                TaskTrigger::Event {
                    event_type: "never".to_string(),
                    event_source: None,
                    depends_on: vec![],
                },
                TaskConfig::default(),
            ))
            .await
            .unwrap();

        let b = h
            .scheduler
            .create_task(input(
                "workflow",
                TaskTrigger::Event {
                    event_type: "never".to_string(),
                    event_source: None,
                    depends_on: vec![a.id],
                },
                TaskConfig::default(),
            ))
            .await
            .unwrap();

        let result = h
            .scheduler
            .update_task(
                a.id,
                TaskPatch {
                    trigger: Some(TaskTrigger::Event {
                        event_type: "never".to_string(),
                        event_source: None,
                        depends_on: vec![b.id],
                    }),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(SchedulerError::InvalidTrigger { .. })));
    }

    #[tokio::test]
    async fn import_merge_skips_existing_ids_and_resets_history() {
        let h = harness().await;
        h.scheduler.register_executor("workflow", EchoExecutor).await;

        let existing = h
            .scheduler
            .create_task(input("workflow", TaskTrigger::Interval { interval_ms: 60_000 }, TaskConfig::default()))
            .await
            .unwrap();

        let mut imported_copy = existing.clone();
        imported_copy.run_count = 99;
        imported_copy.status = TaskStatus::Expired;
        let fresh = ScheduledTask::from_input(input(
            "workflow",
            TaskTrigger::Interval { interval_ms: 30_000 },
            TaskConfig::default(),
        ));

        let report = h
            .scheduler
            .import_tasks(
                ExportEnvelope {
                    version: CURRENT_EXPORT_VERSION,
                    exported_at: Utc::now(),
                    tasks: vec![imported_copy, fresh.clone()],
                },
                ImportMode::Merge,
            )
            .await
            .unwrap();

        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);

        let reloaded = h.store.get_task(fresh.id).await.unwrap().unwrap();
        assert_eq!(reloaded.run_count, 0);
        assert_eq!(reloaded.status, TaskStatus::Active);
    }

    #[tokio::test]
    async fn missed_sweep_recomputes_next_run_without_firing_when_catch_up_disabled() {
        let h = harness().await;
        h.scheduler.register_executor("workflow", EchoExecutor).await;

        let mut config = TaskConfig::default();
        config.run_missed_on_startup = false;
        let mut task = h
            .scheduler
            .create_task(input("workflow", TaskTrigger::Interval { interval_ms: 1_000 }, config))
            .await
            .unwrap();

        task.next_run_at = Some(Utc::now() - chrono::Duration::minutes(5));
        h.store.update_task(&task).await.unwrap();

        h.scheduler.run_missed_sweep().await;

        let executions = h.store.get_task_executions(task.id, 10, None).await.unwrap();
        assert!(executions.is_empty());

        let reloaded = h.store.get_task(task.id).await.unwrap().unwrap();
        assert!(reloaded.next_run_at.unwrap() > Utc::now() - chrono::Duration::seconds(1));
    }

    #[test]
    fn compute_next_run_interval_uses_last_run_or_created_at() {
        let now = Utc::now();
        let created = now - chrono::Duration::minutes(5);
        let trigger = TaskTrigger::Interval { interval_ms: 60_000 };
        let next = compute_next_run(&trigger, None, created, now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn compute_next_run_once_in_the_past_yields_none() {
        let now = Utc::now();
        let trigger = TaskTrigger::Once { run_at: now - chrono::Duration::minutes(1) };
        assert!(compute_next_run(&trigger, None, now, now).is_none());
    }

    #[test]
    fn compute_next_run_event_trigger_is_always_none() {
        let now = Utc::now();
        let trigger = TaskTrigger::Event {
            event_type: "x".to_string(),
            event_source: None,
            depends_on: vec![],
        };
        assert!(compute_next_run(&trigger, None, now, now).is_none());
    }
}
