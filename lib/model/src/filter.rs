//! Query filters consumed by `Store::getFilteredTasks`.

use crate::task::TaskStatus;
use serde::{Deserialize, Serialize};

/// An in-memory AND filter over tasks: every non-empty criterion must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Only tasks whose status is in this list. Empty means no restriction.
    #[serde(default)]
    pub statuses: Vec<TaskStatus>,
    /// Only tasks whose `task_type` is in this list. Empty means no restriction.
    #[serde(default)]
    pub types: Vec<String>,
    /// Only tasks that carry every one of these tags. Empty means no restriction.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Case-insensitive substring search across `name` and `description`.
    #[serde(default)]
    pub search: Option<String>,
}

impl TaskFilter {
    /// Returns true if this filter has no criteria and matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
            && self.types.is_empty()
            && self.tags.is_empty()
            && self.search.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_empty() {
        assert!(TaskFilter::default().is_empty());
    }

    #[test]
    fn filter_with_search_is_not_empty() {
        let filter = TaskFilter {
            search: Some("report".to_string()),
            ..Default::default()
        };
        assert!(!filter.is_empty());
    }
}
