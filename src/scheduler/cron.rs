//! Five-field cron expressions: `MIN HOUR DOM MON DOW`.
//!
//! Each field accepts `*`, a number, a range `a-b`, a step `*/n` or `a-b/n` or `a/n`, and
//! comma-separated lists of those. Months and weekdays also accept three-letter names
//! (`JAN`, `MON`). Weekday `7` is Sunday, like `0`.
//!
//! When both day-of-month and day-of-week are restricted, a day matches if either does,
//! as in classic cron.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::clock::truncate_to_minute;
use crate::error::{Result, VaultflowError};

/// How far `next_after` / `prev_at_or_before` search before giving up
const SEARCH_YEARS: i64 = 5;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// One parsed cron field as a bitmask of allowed values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    bits: u64,
    wildcard: bool,
}

impl Field {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1u64 << value) != 0
    }
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    names_start: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    names_start: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    names_start: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    names_start: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    names_start: 1,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    names_start: 0,
};

/// A parsed cron schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: Field,
    hours: Field,
    days: Field,
    months: Field,
    weekdays: Field,
}

impl CronSchedule {
    /// Parse a five-field expression
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: String| VaultflowError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };

        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(invalid(format!(
                "expected 5 fields (MIN HOUR DOM MON DOW), found {}",
                parts.len()
            )));
        }

        let minutes = parse_field(parts[0], &MINUTE).map_err(&invalid)?;
        let hours = parse_field(parts[1], &HOUR).map_err(&invalid)?;
        let days = parse_field(parts[2], &DAY_OF_MONTH).map_err(&invalid)?;
        let months = parse_field(parts[3], &MONTH).map_err(&invalid)?;
        let mut weekdays = parse_field(parts[4], &DAY_OF_WEEK).map_err(&invalid)?;

        // Fold Sunday-as-7 onto 0
        if weekdays.contains(7) {
            weekdays.bits = (weekdays.bits | 1) & !(1u64 << 7);
        }

        Ok(Self {
            expression: parts.join(" "),
            minutes,
            hours,
            days,
            months,
            weekdays,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days.contains(date.day());
        let dow = self.weekdays.contains(date.weekday().num_days_from_sunday());
        match (self.days.wildcard, self.weekdays.wildcard) {
            (true, true) => true,
            (true, false) => dow,
            (false, true) => dom,
            (false, false) => dom || dow,
        }
    }

    /// Returns true if `at` (seconds ignored) is an occurrence
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        self.months.contains(at.month())
            && self.day_matches(at.date())
            && self.hours.contains(at.hour())
            && self.minutes.contains(at.minute())
    }

    /// First occurrence strictly after `after`
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut candidate = truncate_to_minute(after) + Duration::minutes(1);
        let limit = candidate + Duration::days(366 * SEARCH_YEARS);

        while candidate <= limit {
            let date = candidate.date();
            if !self.months.contains(date.month()) {
                candidate = first_of_next_month(date)?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(date) {
                candidate = date.succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(candidate.hour()) {
                candidate = date.and_hms_opt(candidate.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }
            return Some(candidate);
        }
        None
    }

    /// Most recent occurrence at or before `at`
    pub fn prev_at_or_before(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut candidate = truncate_to_minute(at);
        let limit = candidate - Duration::days(366 * SEARCH_YEARS);

        while candidate >= limit {
            let date = candidate.date();
            if !self.months.contains(date.month()) {
                candidate = date.with_day(1)?.and_hms_opt(0, 0, 0)? - Duration::minutes(1);
                continue;
            }
            if !self.day_matches(date) {
                candidate = date.and_hms_opt(0, 0, 0)? - Duration::minutes(1);
                continue;
            }
            if !self.hours.contains(candidate.hour()) {
                candidate = date.and_hms_opt(candidate.hour(), 0, 0)? - Duration::minutes(1);
                continue;
            }
            if !self.minutes.contains(candidate.minute()) {
                candidate -= Duration::minutes(1);
                continue;
            }
            return Some(candidate);
        }
        None
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

impl FromStr for CronSchedule {
    type Err = VaultflowError;

    fn from_str(s: &str) -> Result<Self> {
        CronSchedule::parse(s)
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

fn parse_field(text: &str, spec: &FieldSpec) -> std::result::Result<Field, String> {
    let mut bits = 0u64;
    for part in text.split(',') {
        if part.is_empty() {
            return Err(format!("empty list element in {} field '{}'", spec.name, text));
        }
        bits |= parse_part(part, spec)?;
    }
    Ok(Field {
        bits,
        wildcard: text == "*",
    })
}

fn parse_part(part: &str, spec: &FieldSpec) -> std::result::Result<u64, String> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("bad step '{}' in {} field", step, spec.name))?;
            if step == 0 {
                return Err(format!("step of zero in {} field", spec.name));
            }
            (range, Some(step))
        }
        None => (part, None),
    };

    let (start, end) = if range == "*" {
        (spec.min, spec.max)
    } else if let Some((lo, hi)) = range.split_once('-') {
        (parse_value(lo, spec)?, parse_value(hi, spec)?)
    } else {
        let value = parse_value(range, spec)?;
        // `a/n` runs from a to the end of the field
        (value, if step.is_some() { spec.max } else { value })
    };

    if start > end {
        return Err(format!("range {}-{} is reversed in {} field", start, end, spec.name));
    }

    let mut bits = 0u64;
    for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
        bits |= 1u64 << value;
    }
    Ok(bits)
}

fn parse_value(text: &str, spec: &FieldSpec) -> std::result::Result<u32, String> {
    let upper = text.to_ascii_uppercase();
    let value = match spec.names.iter().position(|name| *name == upper) {
        Some(index) => index as u32 + spec.names_start,
        None => text
            .parse::<u32>()
            .map_err(|_| format!("'{}' is not a valid {} value", text, spec.name))?,
    };

    if value < spec.min || value > spec.max {
        return Err(format!(
            "{} out of range {}-{} for {} field",
            value, spec.min, spec.max, spec.name
        ));
    }
    Ok(value)
}
