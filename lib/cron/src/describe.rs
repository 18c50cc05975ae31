//! Human-readable descriptions of a [`CronSchedule`], e.g. for task listings.

use crate::field::CronFieldSpec;
use crate::schedule::CronSchedule;
use std::collections::BTreeSet;

const MONTH_NAMES: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const WEEKDAY_NAMES: &[&str] = &["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"];

/// Month values are 1-indexed; weekday values are 0-indexed (0=Sunday).
fn join_month_names(values: &BTreeSet<i64>) -> String {
    values
        .iter()
        .filter_map(|v| MONTH_NAMES.get((*v - 1) as usize))
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_weekday_names(values: &BTreeSet<i64>) -> String {
    values
        .iter()
        .filter_map(|v| WEEKDAY_NAMES.get(*v as usize))
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_values(values: &BTreeSet<i64>) -> String {
    values.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn is_every_step(field: &CronFieldSpec, domain_len: i64) -> Option<i64> {
    if field.is_wildcard {
        return None;
    }
    let values: Vec<i64> = field.values.iter().copied().collect();
    if values.len() < 2 || values[0] != 0 {
        return None;
    }
    let step = values[1] - values[0];
    if step <= 0 {
        return None;
    }
    let expected: Vec<i64> = (0..domain_len).step_by(step as usize).collect();
    if expected == values {
        Some(step)
    } else {
        None
    }
}

impl CronSchedule {
    /// Produces a short English description of when this schedule fires,
    /// e.g. `"every 15 minutes"` or `"at 09:00, on weekdays"`.
    #[must_use]
    pub fn describe(&self) -> String {
        let all_wild = self.minute.is_wildcard
            && self.hour.is_wildcard
            && self.day_of_month.is_wildcard
            && self.month.is_wildcard
            && self.day_of_week.is_wildcard;
        if all_wild {
            return "every minute".to_string();
        }

        if self.hour.is_wildcard && self.day_of_month.is_wildcard && self.month.is_wildcard && self.day_of_week.is_wildcard {
            if let Some(step) = is_every_step(&self.minute, 60) {
                return format!("every {step} minutes");
            }
        }

        let mut parts = Vec::new();

        if !self.minute.is_wildcard
            && !self.hour.is_wildcard
            && self.minute.values.len() == 1
            && self.hour.values.len() == 1
        {
            let hour = *self.hour.values.iter().next().expect("non-empty hour set");
            let minute = *self.minute.values.iter().next().expect("non-empty minute set");
            parts.push(format!("at {hour:02}:{minute:02}"));
        } else {
            if !self.hour.is_wildcard {
                parts.push(format!("at hour {}", join_values(&self.hour.values)));
            }
            if !self.minute.is_wildcard {
                parts.push(format!("at minute {}", join_values(&self.minute.values)));
            }
        }

        if self.day_of_week.values == BTreeSet::from([1, 2, 3, 4, 5]) && self.day_of_month.is_wildcard {
            parts.push("on weekdays".to_string());
        } else {
            if !self.day_of_month.is_wildcard {
                if self.day_of_month.values.len() == 1 {
                    parts.push(format!(
                        "on day {}",
                        self.day_of_month.values.iter().next().expect("non-empty day set")
                    ));
                } else {
                    parts.push(format!("on days {}", join_values(&self.day_of_month.values)));
                }
            }
            if !self.day_of_week.is_wildcard {
                parts.push(format!("on {}", join_weekday_names(&self.day_of_week.values)));
            }
        }

        if !self.month.is_wildcard {
            parts.push(format!("in {}", join_month_names(&self.month.values)));
        }

        if parts.is_empty() {
            "every minute".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_minute() {
        let schedule = CronSchedule::parse("* * * * *", None).unwrap();
        assert_eq!(schedule.describe(), "every minute");
    }

    #[test]
    fn every_n_minutes() {
        let schedule = CronSchedule::parse("*/15 * * * *", None).unwrap();
        assert_eq!(schedule.describe(), "every 15 minutes");
    }

    #[test]
    fn daily_at_time() {
        let schedule = CronSchedule::parse("0 9 * * *", None).unwrap();
        assert_eq!(schedule.describe(), "at 09:00");
    }

    #[test]
    fn weekdays_shorthand() {
        let schedule = CronSchedule::parse("0 9 * * 1-5", None).unwrap();
        assert_eq!(schedule.describe(), "at 09:00, on weekdays");
    }

    #[test]
    fn specific_day_and_month() {
        let schedule = CronSchedule::parse("0 9 1 1 *", None).unwrap();
        assert_eq!(schedule.describe(), "at 09:00, on day 1, in January");
    }
}
