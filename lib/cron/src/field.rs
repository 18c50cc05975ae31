//! Parsing and expansion of a single cron field into a value set.

use crate::error::{CronError, CronFieldKind};
use std::collections::BTreeSet;

/// Three-letter month aliases, case-insensitively matched.
const MONTH_ALIASES: &[(&str, i64)] = &[
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

/// Three-letter weekday aliases, case-insensitively matched. 0=Sunday.
const WEEKDAY_ALIASES: &[(&str, i64)] = &[
    ("sun", 0),
    ("mon", 1),
    ("tue", 2),
    ("wed", 3),
    ("thu", 4),
    ("fri", 5),
    ("sat", 6),
];

fn alias_lookup(kind: CronFieldKind, token: &str) -> Option<i64> {
    let table = match kind {
        CronFieldKind::Month => MONTH_ALIASES,
        CronFieldKind::DayOfWeek => WEEKDAY_ALIASES,
        _ => return None,
    };
    let lower = token.to_ascii_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, value)| *value)
}

/// The expanded value set for one of the five cron fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronFieldSpec {
    /// Sorted, deduplicated set of matching integers within the field's domain.
    pub values: BTreeSet<i64>,
    /// True only when the raw field text was the literal `*` (used by the
    /// day-of-month/day-of-week union tie-break, see `spec.md` §4.1).
    pub is_wildcard: bool,
}

impl CronFieldSpec {
    fn single(value: i64) -> Self {
        let mut values = BTreeSet::new();
        values.insert(value);
        Self {
            values,
            is_wildcard: false,
        }
    }

    fn full_domain(kind: CronFieldKind) -> Self {
        let (min, max) = kind.domain();
        Self {
            values: (min..=max).collect(),
            is_wildcard: true,
        }
    }
}

fn parse_endpoint(kind: CronFieldKind, token: &str) -> Result<i64, CronError> {
    if let Ok(value) = token.parse::<i64>() {
        let (min, max) = kind.domain();
        if value < min || value > max {
            return Err(CronError::OutOfRange {
                field: kind,
                value,
                min,
                max,
            });
        }
        return Ok(value);
    }

    if let Some(value) = alias_lookup(kind, token) {
        return Ok(value);
    }

    Err(CronError::InvalidFormat {
        reason: format!("'{token}' is not a valid {} value", kind.name()),
    })
}

fn parse_range(kind: CronFieldKind, token: &str) -> Result<(i64, i64), CronError> {
    let (start, end) = token.split_once('-').ok_or_else(|| CronError::InvalidRange {
        field: kind,
        reason: format!("'{token}' is not a range"),
    })?;
    let start = parse_endpoint(kind, start)?;
    let end = parse_endpoint(kind, end)?;
    if start > end {
        return Err(CronError::InvalidRange {
            field: kind,
            reason: format!("range start {start} greater than end {end}"),
        });
    }
    Ok((start, end))
}

fn parse_part(kind: CronFieldKind, part: &str) -> Result<BTreeSet<i64>, CronError> {
    if part.is_empty() {
        return Err(CronError::InvalidFormat {
            reason: format!("empty list entry in {} field", kind.name()),
        });
    }

    if let Some((base, step_str)) = part.split_once('/') {
        let step: i64 = step_str.parse().map_err(|_| CronError::InvalidStep {
            field: kind,
            reason: format!("'{step_str}' is not a valid step"),
        })?;
        if step < 1 {
            return Err(CronError::InvalidStep {
                field: kind,
                reason: "step must be >= 1".to_string(),
            });
        }

        let (start, end) = if base == "*" {
            kind.domain()
        } else if base.contains('-') {
            parse_range(kind, base)?
        } else {
            return Err(CronError::InvalidStep {
                field: kind,
                reason: "step base must be '*' or a range".to_string(),
            });
        };

        let values = (start..=end)
            .filter(|value| (value - start) % step == 0)
            .collect();
        return Ok(values);
    }

    if part.contains('-') {
        let (start, end) = parse_range(kind, part)?;
        return Ok((start..=end).collect());
    }

    Ok(std::iter::once(parse_endpoint(kind, part)?).collect())
}

/// Parses one cron field (already split on commas internally) into its
/// expanded value set.
pub fn parse_field(kind: CronFieldKind, raw: &str) -> Result<CronFieldSpec, CronError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CronError::InvalidFormat {
            reason: format!("empty {} field", kind.name()),
        });
    }

    if trimmed == "*" {
        return Ok(CronFieldSpec::full_domain(kind));
    }

    let mut values = BTreeSet::new();
    for part in trimmed.split(',') {
        values.extend(parse_part(kind, part.trim())?);
    }

    if values.is_empty() {
        return Err(CronError::InvalidFormat {
            reason: format!("{} field produced no values", kind.name()),
        });
    }

    Ok(CronFieldSpec {
        values,
        is_wildcard: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_expands_to_full_domain() {
        let spec = parse_field(CronFieldKind::Hour, "*").unwrap();
        assert!(spec.is_wildcard);
        assert_eq!(spec.values.len(), 24);
    }

    #[test]
    fn comma_list_union() {
        let spec = parse_field(CronFieldKind::Minute, "0,15,30,45").unwrap();
        assert_eq!(
            spec.values,
            BTreeSet::from([0, 15, 30, 45])
        );
        assert!(!spec.is_wildcard);
    }

    #[test]
    fn range_expands_inclusive() {
        let spec = parse_field(CronFieldKind::Hour, "9-11").unwrap();
        assert_eq!(spec.values, BTreeSet::from([9, 10, 11]));
    }

    #[test]
    fn step_from_wildcard() {
        let spec = parse_field(CronFieldKind::Minute, "*/15").unwrap();
        assert_eq!(spec.values, BTreeSet::from([0, 15, 30, 45]));
    }

    #[test]
    fn step_from_range() {
        let spec = parse_field(CronFieldKind::Hour, "0-10/5").unwrap();
        assert_eq!(spec.values, BTreeSet::from([0, 5, 10]));
    }

    #[test]
    fn month_alias_case_insensitive() {
        let spec = parse_field(CronFieldKind::Month, "Jan,DEC").unwrap();
        assert_eq!(spec.values, BTreeSet::from([1, 12]));
    }

    #[test]
    fn weekday_alias() {
        let spec = parse_field(CronFieldKind::DayOfWeek, "mon-fri").unwrap();
        assert_eq!(spec.values, BTreeSet::from([1, 2, 3, 4, 5]));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let err = parse_field(CronFieldKind::Hour, "24").unwrap_err();
        assert!(matches!(err, CronError::OutOfRange { .. }));
    }

    #[test]
    fn invalid_range_order_is_rejected() {
        let err = parse_field(CronFieldKind::Hour, "10-5").unwrap_err();
        assert!(matches!(err, CronError::InvalidRange { .. }));
    }

    #[test]
    fn bare_number_step_base_is_rejected() {
        let err = parse_field(CronFieldKind::Minute, "5/10").unwrap_err();
        assert!(matches!(err, CronError::InvalidStep { .. }));
    }

    #[test]
    fn zero_step_is_rejected() {
        let err = parse_field(CronFieldKind::Minute, "*/0").unwrap_err();
        assert!(matches!(err, CronError::InvalidStep { .. }));
    }
}
