//! The scheduler engine: timers, the execution pipeline, retry/backoff,
//! dependency chaining, and the plugging points a host implements
//! (`Executor`, `NotificationSink`, `LifecycleHooks`). See `spec.md` §4.4.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod executor;
pub mod notification;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use event_bus::EventBus;
pub use executor::{EchoExecutor, Executor, ExecutorOutcome, ExecutorRegistry, FailingExecutor, SleepingExecutor};
pub use notification::{LifecycleHooks, NoopLifecycleHooks, NoopNotificationSink, NotificationEvent, NotificationSink};
pub use scheduler::{compute_next_run, Scheduler};
