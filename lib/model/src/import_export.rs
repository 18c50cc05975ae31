//! Import/export envelope, per `spec.md` §6.5.

use crate::task::ScheduledTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The current (and, so far, only) supported envelope version.
pub const CURRENT_EXPORT_VERSION: u32 = 1;

/// The serialized form of an export: tasks only, no execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEnvelope {
    /// Envelope format version.
    pub version: u32,
    /// When the export was produced.
    pub exported_at: DateTime<Utc>,
    /// The exported tasks.
    pub tasks: Vec<ScheduledTask>,
}

impl ExportEnvelope {
    /// Builds a new envelope at the current version.
    #[must_use]
    pub fn new(tasks: Vec<ScheduledTask>) -> Self {
        Self {
            version: CURRENT_EXPORT_VERSION,
            exported_at: Utc::now(),
            tasks,
        }
    }
}

/// How `importTasks` reconciles incoming tasks against existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Skip any incoming task whose id already exists.
    Merge,
    /// Delete every existing task first, then import all incoming ones.
    Replace,
}

/// Outcome of an `importTasks` call. Errors are per-task; import never
/// throws as a whole (`spec.md` §7).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Number of tasks successfully imported.
    pub imported: u32,
    /// Number of tasks skipped (already present, in `merge` mode).
    pub skipped: u32,
    /// Per-task validation/error messages.
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_envelope_uses_current_version() {
        let envelope = ExportEnvelope::new(vec![]);
        assert_eq!(envelope.version, CURRENT_EXPORT_VERSION);
    }
}
