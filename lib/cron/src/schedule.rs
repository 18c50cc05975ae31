//! A parsed, validated cron schedule and next-fire computation.

use crate::error::{CronError, CronFieldKind};
use crate::field::{parse_field, CronFieldSpec};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// How far into the future `next_fire` is willing to search before giving
/// up and reporting "no fire" (`spec.md` §4.1: "bounded (>= 4 years)").
const SEARCH_HORIZON_DAYS: i64 = 5 * 366;

/// A parsed 5-field cron expression, optionally bound to an IANA time zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    /// The original expression text, kept for display/debugging.
    pub expression: String,
    /// The IANA time zone name, if one was supplied. `None` means UTC.
    pub timezone: Option<String>,
    pub(crate) minute: CronFieldSpec,
    pub(crate) hour: CronFieldSpec,
    pub(crate) day_of_month: CronFieldSpec,
    pub(crate) month: CronFieldSpec,
    pub(crate) day_of_week: CronFieldSpec,
}

impl CronSchedule {
    /// Parses a 5-field cron expression (minute hour day-of-month month
    /// day-of-week), optionally in the given IANA time zone.
    ///
    /// # Errors
    ///
    /// Returns a [`CronError`] describing exactly which field (or the
    /// overall shape) failed validation.
    pub fn parse(expression: &str, timezone: Option<&str>) -> Result<Self, CronError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::InvalidFormat {
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        if let Some(tz) = timezone {
            Tz::from_str(tz).map_err(|_| CronError::InvalidTimezone {
                timezone: tz.to_string(),
            })?;
        }

        Ok(Self {
            expression: expression.to_string(),
            timezone: timezone.map(ToString::to_string),
            minute: parse_field(CronFieldKind::Minute, fields[0])?,
            hour: parse_field(CronFieldKind::Hour, fields[1])?,
            day_of_month: parse_field(CronFieldKind::DayOfMonth, fields[2])?,
            month: parse_field(CronFieldKind::Month, fields[3])?,
            day_of_week: parse_field(CronFieldKind::DayOfWeek, fields[4])?,
        })
    }

    /// Resolves the configured time zone, defaulting to UTC.
    fn resolve_tz(&self) -> Tz {
        self.timezone
            .as_deref()
            .and_then(|tz| Tz::from_str(tz).ok())
            .unwrap_or(Tz::UTC)
    }

    /// The Vixie-cron day tie-break: when both day-of-month and day-of-week
    /// are restricted, a date matches if *either* set contains it.
    fn day_matches(&self, day_of_month: i64, day_of_week: i64) -> bool {
        match (self.day_of_month.is_wildcard, self.day_of_week.is_wildcard) {
            (true, true) => true,
            (false, true) => self.day_of_month.values.contains(&day_of_month),
            (true, false) => self.day_of_week.values.contains(&day_of_week),
            (false, false) => {
                self.day_of_month.values.contains(&day_of_month)
                    || self.day_of_week.values.contains(&day_of_week)
            }
        }
    }

    /// Returns whether the given instant (in this schedule's time zone)
    /// satisfies every field.
    #[must_use]
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.resolve_tz());
        let dow = local.weekday().num_days_from_sunday() as i64;
        self.minute.values.contains(&(local.minute() as i64))
            && self.hour.values.contains(&(local.hour() as i64))
            && self.month.values.contains(&(local.month() as i64))
            && self.day_matches(local.day() as i64, dow)
    }

    /// Finds the earliest instant strictly after `from` that satisfies this
    /// schedule, bounded by a multi-year search horizon.
    ///
    /// Returns `None` if no matching instant exists within the horizon
    /// (e.g. `31 2 * *` — a day no month has).
    #[must_use]
    pub fn next_fire(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let tz = self.resolve_tz();
        let start_local = from.with_timezone(&tz);
        let truncated = start_local.with_second(0)?.with_nanosecond(0)?;
        let mut candidate = truncated + Duration::minutes(1);
        let horizon = start_local + Duration::days(SEARCH_HORIZON_DAYS);

        while candidate <= horizon {
            if !self.month.values.contains(&(candidate.month() as i64)) {
                candidate = first_of_next_month(candidate);
                continue;
            }

            let dow = candidate.weekday().num_days_from_sunday() as i64;
            if !self.day_matches(candidate.day() as i64, dow) {
                candidate = next_midnight(candidate);
                continue;
            }

            if !self.hour.values.contains(&(candidate.hour() as i64)) {
                candidate = next_hour_boundary(candidate);
                continue;
            }

            if !self.minute.values.contains(&(candidate.minute() as i64)) {
                candidate += Duration::minutes(1);
                continue;
            }

            return Some(candidate.with_timezone(&Utc));
        }

        None
    }

    /// Returns the next `count` fire times strictly after `from`.
    #[must_use]
    pub fn next_fires(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut results = Vec::with_capacity(count);
        let mut cursor = from;
        for _ in 0..count {
            match self.next_fire(cursor) {
                Some(next) => {
                    results.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        results
    }
}

/// Resolves an ambiguous/nonexistent local wall-clock time to a concrete
/// instant, preferring the earlier offset on DST-fold ambiguity and
/// nudging forward minute-by-minute through DST-gap nonexistence.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _later) => earlier,
        LocalResult::None => {
            let mut probe = naive;
            for _ in 0..180 {
                probe += Duration::minutes(1);
                if let LocalResult::Single(dt) = tz.from_local_datetime(&probe) {
                    return dt;
                }
            }
            tz.from_utc_datetime(&naive)
        }
    }
}

fn first_of_next_month(dt: DateTime<Tz>) -> DateTime<Tz> {
    let (year, month) = if dt.month() == 12 {
        (dt.year() + 1, 1)
    } else {
        (dt.year(), dt.month() + 1)
    };
    let naive = NaiveDate::from_ymd_opt(year, month, 1)
        .expect("valid first-of-month date")
        .and_hms_opt(0, 0, 0)
        .expect("valid midnight time");
    resolve_local(dt.timezone(), naive)
}

fn next_midnight(dt: DateTime<Tz>) -> DateTime<Tz> {
    let naive = dt.date_naive().and_hms_opt(0, 0, 0).expect("valid midnight") + Duration::days(1);
    resolve_local(dt.timezone(), naive)
}

fn next_hour_boundary(dt: DateTime<Tz>) -> DateTime<Tz> {
    let naive = dt
        .date_naive()
        .and_hms_opt(dt.hour(), 0, 0)
        .expect("valid hour boundary")
        + Duration::hours(1);
    resolve_local(dt.timezone(), naive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = CronSchedule::parse("* * *", None).unwrap_err();
        assert!(matches!(err, CronError::InvalidFormat { .. }));
    }

    #[test]
    fn rejects_unknown_timezone() {
        let err = CronSchedule::parse("0 9 * * *", Some("Not/AZone")).unwrap_err();
        assert!(matches!(err, CronError::InvalidTimezone { .. }));
    }

    #[test]
    fn daily_nine_am_crosses_day_boundary() {
        // spec.md S1: "0 9 * * *" from 2024-01-15T10:00:00Z -> next fire 2024-01-16T09:00 local (UTC here).
        let schedule = CronSchedule::parse("0 9 * * *", None).unwrap();
        let from = utc(2024, 1, 15, 10, 0);
        let next = schedule.next_fire(from).unwrap();
        assert_eq!(next, utc(2024, 1, 16, 9, 0));
    }

    #[test]
    fn next_fires_are_strictly_increasing() {
        let schedule = CronSchedule::parse("0 9 * * *", None).unwrap();
        let from = utc(2024, 1, 15, 10, 0);
        let fires = schedule.next_fires(from, 3);
        assert_eq!(fires.len(), 3);
        assert!(fires[0] < fires[1]);
        assert!(fires[1] < fires[2]);
        for fire in &fires {
            assert!(schedule.matches(*fire));
        }
    }

    #[test]
    fn every_fifteen_minutes() {
        let schedule = CronSchedule::parse("*/15 * * * *", None).unwrap();
        let from = utc(2024, 1, 15, 10, 1);
        let next = schedule.next_fire(from).unwrap();
        assert_eq!(next, utc(2024, 1, 15, 10, 15));
    }

    #[test]
    fn vixie_union_rule_matches_either_day_field() {
        // 1st of month OR Friday.
        let schedule = CronSchedule::parse("0 0 1 * fri", None).unwrap();
        // 2024-01-05 is a Friday but not the 1st.
        assert!(schedule.matches(utc(2024, 1, 5, 0, 0)));
        // 2024-01-01 is a Monday but is the 1st.
        assert!(schedule.matches(utc(2024, 1, 1, 0, 0)));
        // 2024-01-02 is neither.
        assert!(!schedule.matches(utc(2024, 1, 2, 0, 0)));
    }

    #[test]
    fn single_day_field_restricts_normally() {
        let schedule = CronSchedule::parse("0 0 15 * *", None).unwrap();
        assert!(schedule.matches(utc(2024, 1, 15, 0, 0)));
        assert!(!schedule.matches(utc(2024, 1, 16, 0, 0)));
    }

    #[test]
    fn impossible_date_returns_none_within_horizon() {
        // February never has a 30th.
        let schedule = CronSchedule::parse("0 0 30 2 *", None).unwrap();
        let from = utc(2024, 1, 1, 0, 0);
        assert!(schedule.next_fire(from).is_none());
    }

    #[test]
    fn timezone_aware_next_fire() {
        let schedule = CronSchedule::parse("0 9 * * *", Some("America/New_York")).unwrap();
        // 9am US/Eastern on 2024-01-16 is 14:00 UTC (EST, UTC-5).
        let from = utc(2024, 1, 15, 10, 0);
        let next = schedule.next_fire(from).unwrap();
        assert_eq!(next, utc(2024, 1, 16, 14, 0));
    }

    #[test]
    fn matches_is_consistent_with_next_fire() {
        let schedule = CronSchedule::parse("30 6 * * 1-5", None).unwrap();
        let from = utc(2024, 3, 1, 0, 0);
        let next = schedule.next_fire(from).unwrap();
        assert!(schedule.matches(next));
        let following = schedule.next_fire(next).unwrap();
        assert!(following > next);
    }
}
