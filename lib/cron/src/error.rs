//! Error types for cron parsing.

use std::fmt;

/// Which of the five cron fields an error applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronFieldKind {
    /// Minute field (0-59).
    Minute,
    /// Hour field (0-23).
    Hour,
    /// Day-of-month field (1-31).
    DayOfMonth,
    /// Month field (1-12).
    Month,
    /// Day-of-week field (0-6, 0=Sunday).
    DayOfWeek,
}

impl CronFieldKind {
    /// The inclusive domain bounds for this field.
    #[must_use]
    pub fn domain(self) -> (i64, i64) {
        match self {
            Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::DayOfMonth => (1, 31),
            Self::Month => (1, 12),
            Self::DayOfWeek => (0, 6),
        }
    }

    /// Human-readable name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::DayOfMonth => "day-of-month",
            Self::Month => "month",
            Self::DayOfWeek => "day-of-week",
        }
    }
}

impl fmt::Display for CronFieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-field error classification, per `spec.md` §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    /// The expression did not split into exactly five whitespace-separated fields.
    InvalidFormat { reason: String },
    /// A value (or range endpoint) fell outside the field's domain.
    OutOfRange {
        field: CronFieldKind,
        value: i64,
        min: i64,
        max: i64,
    },
    /// A `base/k` step expression had an invalid step or base.
    InvalidStep { field: CronFieldKind, reason: String },
    /// An `a-b` range had `a > b` or a malformed endpoint.
    InvalidRange { field: CronFieldKind, reason: String },
    /// The supplied IANA time zone name is not recognized.
    InvalidTimezone { timezone: String },
}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat { reason } => write!(f, "invalid cron format: {reason}"),
            Self::OutOfRange { field, value, min, max } => write!(
                f,
                "{field} value {value} out of range [{min}, {max}]"
            ),
            Self::InvalidStep { field, reason } => {
                write!(f, "invalid step for {field}: {reason}")
            }
            Self::InvalidRange { field, reason } => {
                write!(f, "invalid range for {field}: {reason}")
            }
            Self::InvalidTimezone { timezone } => write!(f, "invalid timezone: {timezone}"),
        }
    }
}

impl std::error::Error for CronError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_kind_domains() {
        assert_eq!(CronFieldKind::Minute.domain(), (0, 59));
        assert_eq!(CronFieldKind::DayOfWeek.domain(), (0, 6));
    }

    #[test]
    fn display_messages_mention_field_name() {
        let err = CronError::OutOfRange {
            field: CronFieldKind::Hour,
            value: 25,
            min: 0,
            max: 23,
        };
        assert!(err.to_string().contains("hour"));
    }
}
