//! Trigger configurations that bind a task to a firing rule.

use scheduler_core::TaskId;
use serde::{Deserialize, Serialize};

/// A tagged variant describing when a task should fire.
///
/// Exactly one alternative applies to any given task; see `spec.md` §3.2
/// invariant 2 for how each variant relates to `nextRunAt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskTrigger {
    /// Wall-clock cron schedule, optionally in a named IANA time zone.
    Cron {
        /// The 5-field cron expression (minute hour day-of-month month day-of-week).
        expression: String,
        /// IANA time zone name. Defaults to UTC when absent.
        timezone: Option<String>,
    },
    /// Fixed-period interval, relative to the last run (or creation time).
    Interval {
        /// Period in milliseconds. Must be greater than zero.
        interval_ms: i64,
    },
    /// Single future firing at an exact instant.
    Once {
        /// The instant to fire at.
        run_at: chrono::DateTime<chrono::Utc>,
    },
    /// Fires in response to a named in-process event.
    Event {
        /// The event type this task listens for.
        event_type: String,
        /// Restricts matching to events from this source, when present.
        event_source: Option<String>,
        /// Tasks this one depends on; it only fires once all of them have a
        /// most-recent completed execution (see `spec.md` §4.4.7).
        #[serde(default)]
        depends_on: Vec<TaskId>,
    },
}

impl TaskTrigger {
    /// Returns a short discriminator name for logging and statistics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cron { .. } => "cron",
            Self::Interval { .. } => "interval",
            Self::Once { .. } => "once",
            Self::Event { .. } => "event",
        }
    }

    /// Returns the dependency list for `event` triggers, empty otherwise.
    #[must_use]
    pub fn depends_on(&self) -> &[TaskId] {
        match self {
            Self::Event { depends_on, .. } => depends_on,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_trigger_roundtrip() {
        let trigger = TaskTrigger::Cron {
            expression: "0 9 * * *".to_string(),
            timezone: Some("America/New_York".to_string()),
        };
        let json = serde_json::to_string(&trigger).unwrap();
        let parsed: TaskTrigger = serde_json::from_str(&json).unwrap();
        assert_eq!(trigger, parsed);
        assert_eq!(trigger.kind(), "cron");
    }

    #[test]
    fn event_trigger_depends_on() {
        let dep = TaskId::new();
        let trigger = TaskTrigger::Event {
            event_type: "order.created".to_string(),
            event_source: None,
            depends_on: vec![dep],
        };
        assert_eq!(trigger.depends_on(), &[dep]);
    }

    #[test]
    fn non_event_trigger_has_no_dependencies() {
        let trigger = TaskTrigger::Interval { interval_ms: 60_000 };
        assert!(trigger.depends_on().is_empty());
    }
}
