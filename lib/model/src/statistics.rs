//! Aggregate scheduler statistics, computed index-side by the store.

use serde::{Deserialize, Serialize};

/// Snapshot of scheduler-wide counts, per `spec.md` §4.2 `getStatistics`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SchedulerStatistics {
    /// Total number of tasks of any status.
    pub total_tasks: u64,
    /// Number of `active` tasks.
    pub active_tasks: u64,
    /// Number of `paused` tasks.
    pub paused_tasks: u64,
    /// Number of `active` tasks with a future `next_run_at` (same rule as
    /// `getUpcomingTasks`).
    pub upcoming_count: u64,
    /// Total number of execution records.
    pub total_executions: u64,
    /// Number of `completed` execution records.
    pub completed_executions: u64,
    /// Number of `failed` execution records.
    pub failed_executions: u64,
    /// Mean duration (ms) over `completed` executions, if any exist.
    pub average_duration_ms: Option<f64>,
}
