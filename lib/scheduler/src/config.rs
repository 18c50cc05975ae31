//! Layered configuration for a `Scheduler` instance.

use serde::{Deserialize, Serialize};

/// Runtime knobs the distilled spec left as constants but a deployable
/// crate needs to make configurable. Loaded through the `config` crate:
/// compiled defaults, then an optional file, then `SCHEDULER_`-prefixed
/// environment variables, in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Path to the SQLite database file backing the store and coordination
    /// tables.
    pub database_path: String,
    /// Storage realm name used for leader election.
    pub realm: String,
    /// Cadence, in seconds, of the missed-task sweep (`spec.md` §4.4.4/4.4.6).
    pub sweep_interval_secs: u64,
    /// Cadence, in seconds, of the execution retention cleanup (`spec.md` §4.5).
    pub retention_interval_secs: u64,
    /// Maximum age, in days, of execution records kept by retention.
    pub retention_max_age_days: i64,
    /// Default execution timeout, in milliseconds, for tasks that don't
    /// override `config.timeout_ms`.
    pub default_timeout_ms: i64,
    /// Default base retry delay, in milliseconds.
    pub default_retry_delay_ms: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            database_path: "scheduler.db".to_string(),
            realm: "default".to_string(),
            sweep_interval_secs: 60,
            retention_interval_secs: 24 * 60 * 60,
            retention_max_age_days: 30,
            default_timeout_ms: 30_000,
            default_retry_delay_ms: 1_000,
        }
    }
}

impl SchedulerConfig {
    /// Loads configuration from compiled defaults, an optional file at
    /// `path`, and `SCHEDULER_`-prefixed environment variables, in that
    /// precedence order.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&defaults)?,
        );
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("SCHEDULER"));
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_reasonable() {
        let config = SchedulerConfig::default();
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.retention_max_age_days, 30);
    }
}
