// Cron expression handling
//
// Jobs carry standard 5-field cron strings (weekday 0 or 7 = Sunday). The
// `cron` crate expects a leading seconds field and numbers weekdays 1-7 from
// Sunday, so weekday numbers are rewritten to names before handing over.

use crate::domain::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const EXPECTED_FORMAT: &str =
    "Invalid cron expression format. Expected 5 parts: minute hour day_of_month month day_of_week";

const WEEKDAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// The five fields of a standard cron expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSpec {
    pub minute: String,
    pub hour: String,
    pub day: String,
    pub month: String,
    pub weekday: String,
}

impl CronSpec {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        match parts.as_slice() {
            [minute, hour, day, month, weekday] => Ok(Self {
                minute: minute.to_string(),
                hour: hour.to_string(),
                day: day.to_string(),
                month: month.to_string(),
                weekday: weekday.to_string(),
            }),
            _ => Err(DomainError::Configuration(format!(
                "{} (got {} in '{}')",
                EXPECTED_FORMAT,
                parts.len(),
                expression
            ))),
        }
    }

    /// Expression in the 6-field dialect of the `cron` crate
    pub fn to_schedule_expression(&self) -> String {
        format!(
            "0 {} {} {} {} {}",
            self.minute,
            self.hour,
            self.day,
            self.month,
            weekday_names(&self.weekday)
        )
    }

    pub fn to_schedule(&self) -> Result<Schedule> {
        let expression = self.to_schedule_expression();
        Schedule::from_str(&expression).map_err(|e| {
            DomainError::Configuration(format!("Invalid cron expression '{}': {}", self, e))
        })
    }

    /// First fire time strictly after `after`
    pub fn next_after(schedule: &Schedule, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        schedule.after(after).next()
    }
}

impl std::fmt::Display for CronSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day, self.month, self.weekday
        )
    }
}

// Numeric items are expanded to day names: the `cron` crate rejects ranges
// that wrap past Saturday (`5-7`) and steps from a bare start (`1/2`).
// Named items are passed through untouched.
fn weekday_names(field: &str) -> String {
    if field == "*" || field == "?" {
        return field.to_string();
    }

    let mut days = [false; 7];
    let mut passthrough: Vec<&str> = Vec::new();
    for item in field.split(',') {
        match expand_weekdays(item) {
            Some(expanded) => expanded.into_iter().for_each(|d| days[d] = true),
            None => passthrough.push(item),
        }
    }

    if passthrough.is_empty() && days.iter().all(|&d| d) {
        return "*".to_string();
    }
    let mut out: Vec<&str> = days
        .iter()
        .enumerate()
        .filter(|&(_, &on)| on)
        .map(|(d, _)| WEEKDAY_NAMES[d])
        .collect();
    out.extend(passthrough);
    out.join(",")
}

/// Days (0 = Sunday) selected by one numeric list item; `None` if not numeric
fn expand_weekdays(item: &str) -> Option<Vec<usize>> {
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => (base, Some(step.parse::<usize>().ok().filter(|&s| s > 0)?)),
        None => (item, None),
    };
    let (first, last) = match base {
        "*" => (0, 6),
        _ => match base.split_once('-') {
            Some((a, b)) => (weekday_number(a)?, weekday_number(b)?),
            // `N/step` runs to the end of the week
            None if step.is_some() => (weekday_number(base)?, 6),
            None => {
                let n = weekday_number(base)?;
                (n, n)
            }
        },
    };
    if first > last {
        return None;
    }
    Some(
        (first..=last)
            .step_by(step.unwrap_or(1))
            .map(|d| d % 7)
            .collect(),
    )
}

fn weekday_number(s: &str) -> Option<usize> {
    s.parse::<usize>().ok().filter(|&n| n <= 7)
}
