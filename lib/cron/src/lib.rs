//! Cron expression parsing, Vixie-style day-field union semantics, and
//! timezone-aware next-fire computation for the task scheduler.

mod describe;
pub mod error;
mod field;
mod schedule;

pub use error::{CronError, CronFieldKind};
pub use schedule::CronSchedule;
