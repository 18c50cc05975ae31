//! An in-memory `Store` implementation for tests and fast iteration.

use crate::error::StoreError;
use crate::traits::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{ExecutionId, TaskId};
use scheduler_model::{
    ScheduledTask, SchedulerStatistics, TaskExecution, TaskFilter, TaskStatus, TaskTrigger,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// `Arc<Mutex<..>>`-backed store, mirroring the teacher's
/// `InMemoryEventStore`/`InMemoryObjectStore` test doubles.
#[derive(Default)]
pub struct InMemoryStore {
    tasks: Mutex<HashMap<TaskId, ScheduledTask>>,
    executions: Mutex<HashMap<ExecutionId, TaskExecution>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_task(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().expect("store mutex poisoned");
        if tasks.contains_key(&task.id) {
            return Err(StoreError::TaskAlreadyExists {
                id: task.id.to_string(),
            });
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().expect("store mutex poisoned");
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete_task(&self, id: TaskId) -> Result<bool, StoreError> {
        let existed = self.tasks.lock().expect("store mutex poisoned").remove(&id).is_some();
        if existed {
            self.executions
                .lock()
                .expect("store mutex poisoned")
                .retain(|_, execution| execution.task_id != id);
        }
        Ok(existed)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<ScheduledTask>, StoreError> {
        Ok(self.tasks.lock().expect("store mutex poisoned").get(&id).cloned())
    }

    async fn get_all_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        Ok(self.tasks.lock().expect("store mutex poisoned").values().cloned().collect())
    }

    async fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<ScheduledTask>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|task| task.status == status)
            .cloned()
            .collect())
    }

    async fn get_active_event_tasks(&self, event_type: Option<&str>) -> Result<Vec<ScheduledTask>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|task| task.status == TaskStatus::Active)
            .filter(|task| match &task.trigger {
                TaskTrigger::Event { event_type: ty, .. } => {
                    event_type.is_none_or(|requested| requested == ty)
                }
                _ => false,
            })
            .cloned()
            .collect())
    }

    async fn get_upcoming_tasks(&self, limit: u32) -> Result<Vec<ScheduledTask>, StoreError> {
        let now = Utc::now();
        let mut upcoming: Vec<ScheduledTask> = self
            .tasks
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|task| task.status == TaskStatus::Active)
            .filter(|task| task.next_run_at.is_some_and(|next| next > now))
            .cloned()
            .collect();
        upcoming.sort_by_key(|task| task.next_run_at);
        upcoming.truncate(limit as usize);
        Ok(upcoming)
    }

    async fn get_filtered_tasks(&self, filter: &TaskFilter) -> Result<Vec<ScheduledTask>, StoreError> {
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        Ok(self
            .tasks
            .lock()
            .expect("store mutex poisoned")
            .values()
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
            .cloned()
            .collect())
    }

    async fn create_execution(&self, execution: &TaskExecution) -> Result<(), StoreError> {
        self.executions
            .lock()
            .expect("store mutex poisoned")
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &TaskExecution) -> Result<(), StoreError> {
        self.executions
            .lock()
            .expect("store mutex poisoned")
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<TaskExecution>, StoreError> {
        Ok(self.executions.lock().expect("store mutex poisoned").get(&id).cloned())
    }

    async fn get_task_executions(
        &self,
        task_id: TaskId,
        limit: u32,
        before_started_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<TaskExecution>, StoreError> {
        let mut matching: Vec<TaskExecution> = self
            .executions
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|execution| execution.task_id == task_id)
            .filter(|execution| before_started_at.is_none_or(|cursor| execution.started_at < cursor))
            .cloned()
            .collect();
        matching.sort_by_key(|execution| std::cmp::Reverse(execution.started_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn get_recent_executions(&self, limit: u32) -> Result<Vec<TaskExecution>, StoreError> {
        let mut all: Vec<TaskExecution> = self
            .executions
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|execution| std::cmp::Reverse(execution.started_at));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn cleanup_old_executions(&self, max_age_days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        let mut executions = self.executions.lock().expect("store mutex poisoned");
        let before = executions.len();
        executions.retain(|_, execution| execution.started_at >= cutoff);
        Ok((before - executions.len()) as u64)
    }

    async fn get_statistics(&self) -> Result<SchedulerStatistics, StoreError> {
        let tasks = self.tasks.lock().expect("store mutex poisoned");
        let executions = self.executions.lock().expect("store mutex poisoned");
        let now = Utc::now();

        let total_tasks = tasks.len() as u64;
        let active_tasks = tasks.values().filter(|t| t.status == TaskStatus::Active).count() as u64;
        let paused_tasks = tasks.values().filter(|t| t.status == TaskStatus::Paused).count() as u64;
        let upcoming_count = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Active)
            .filter(|t| t.next_run_at.is_some_and(|next| next > now))
            .count() as u64;

        let total_executions = executions.len() as u64;
        let completed: Vec<&TaskExecution> = executions
            .values()
            .filter(|e| e.status == scheduler_model::ExecutionStatus::Completed)
            .collect();
        let completed_executions = completed.len() as u64;
        let failed_executions = executions
            .values()
            .filter(|e| e.status == scheduler_model::ExecutionStatus::Failed)
            .count() as u64;
        let average_duration_ms = if completed.is_empty() {
            None
        } else {
            let total: i64 = completed.iter().filter_map(|e| e.duration_ms).sum();
            Some(total as f64 / completed.len() as f64)
        };

        Ok(SchedulerStatistics {
            total_tasks,
            active_tasks,
            paused_tasks,
            upcoming_count,
            total_executions,
            completed_executions,
            failed_executions,
            average_duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_model::{CreateTaskInput, NotificationConfig, TaskConfig};
    use serde_json::Value as JsonValue;

    fn sample_task(name: &str) -> ScheduledTask {
        ScheduledTask::from_input(CreateTaskInput {
            name: name.to_string(),
            description: None,
            tags: vec![],
            task_type: "workflow".to_string(),
            trigger: TaskTrigger::Interval { interval_ms: 60_000 },
            payload: JsonValue::Null,
            config: TaskConfig::default(),
            notification: NotificationConfig::default(),
        })
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryStore::new();
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();
        let fetched = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "t1");
    }

    #[tokio::test]
    async fn create_task_rejects_duplicate_id() {
        let store = InMemoryStore::new();
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();
        let err = store.create_task(&task).await.unwrap_err();
        assert!(matches!(err, StoreError::TaskAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn delete_task_removes_its_executions() {
        let store = InMemoryStore::new();
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();
        let execution = TaskExecution::start(task.id, "t1", "workflow", 0, None);
        store.create_execution(&execution).await.unwrap();

        let existed = store.delete_task(task.id).await.unwrap();
        assert!(existed);
        assert!(store.get_execution(execution.id).await.unwrap().is_none());

        let existed_again = store.delete_task(task.id).await.unwrap();
        assert!(!existed_again);
    }

    #[tokio::test]
    async fn get_filtered_tasks_applies_and_semantics() {
        let store = InMemoryStore::new();
        let mut a = sample_task("alpha");
        a.tags = vec!["x".to_string()];
        let mut b = sample_task("beta");
        b.tags = vec!["y".to_string()];
        store.create_task(&a).await.unwrap();
        store.create_task(&b).await.unwrap();

        let filter = TaskFilter {
            search: Some("alph".to_string()),
            ..Default::default()
        };
        let results = store.get_filtered_tasks(&filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "alpha");
    }

    #[tokio::test]
    async fn statistics_reflect_stored_state() {
        let store = InMemoryStore::new();
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();

        let mut execution = TaskExecution::start(task.id, "t1", "workflow", 0, None);
        execution.complete(None);
        store.create_execution(&execution).await.unwrap();

        let stats = store.get_statistics().await.unwrap();
        assert_eq!(stats.total_tasks, 1);
        assert_eq!(stats.active_tasks, 1);
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.completed_executions, 1);
        assert!(stats.average_duration_ms.is_some());
    }

    #[tokio::test]
    async fn cleanup_old_executions_removes_only_expired_rows() {
        let store = InMemoryStore::new();
        let task = sample_task("t1");
        store.create_task(&task).await.unwrap();

        let mut old = TaskExecution::start(task.id, "t1", "workflow", 0, None);
        old.started_at = Utc::now() - chrono::Duration::days(40);
        store.create_execution(&old).await.unwrap();

        let fresh = TaskExecution::start(task.id, "t1", "workflow", 0, None);
        store.create_execution(&fresh).await.unwrap();

        let removed = store.cleanup_old_executions(30).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_execution(old.id).await.unwrap().is_none());
        assert!(store.get_execution(fresh.id).await.unwrap().is_some());
    }
}
