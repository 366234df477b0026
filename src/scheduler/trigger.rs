//! Triggers and next-run delay computation.
//!
//! Cron support is a narrow subset. Exactly three shapes are recognized:
//!
//! | Expression      | Next run                               |
//! |-----------------|----------------------------------------|
//! | `0 0 * * *`     | next local midnight                    |
//! | `*/N * * * *`   | next minute that is a multiple of N    |
//! | `K * * * *`     | next time the minute hand reaches K    |
//!
//! Any other five-field expression runs one hour later. Expressions without
//! exactly five fields run 60 seconds later. Both fallbacks are logged.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Delay used for well-formed cron expressions outside the supported subset.
pub const UNSUPPORTED_CRON_DELAY: Duration = Duration::from_secs(60 * 60);

/// Delay used for expressions that do not have five fields.
pub const MALFORMED_CRON_DELAY: Duration = Duration::from_millis(60_000);

/// Calendar boundaries a task can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarEvent {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for CalendarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarEvent::Daily => write!(f, "daily"),
            CalendarEvent::Weekly => write!(f, "weekly"),
            CalendarEvent::Monthly => write!(f, "monthly"),
        }
    }
}

/// When a task runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Trigger {
    /// Only runs when triggered explicitly.
    Manual,
    Interval { milliseconds: u64 },
    Cron { expression: String },
    Event { event: CalendarEvent },
}

impl Trigger {
    pub fn interval(milliseconds: u64) -> Self {
        Trigger::Interval { milliseconds }
    }

    pub fn cron(expression: impl Into<String>) -> Self {
        Trigger::Cron {
            expression: expression.into(),
        }
    }

    pub fn event(event: CalendarEvent) -> Self {
        Trigger::Event { event }
    }

    /// Time from `now` until the next run, or `None` for manual triggers.
    pub fn delay_from<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<Duration> {
        match self {
            Trigger::Manual => None,
            Trigger::Interval { milliseconds } => Some(Duration::from_millis(*milliseconds)),
            Trigger::Cron { expression } => {
                let shape = CronShape::parse(expression);
                match shape {
                    CronShape::Unsupported => warn!(
                        "Cron expression '{}' is outside the supported subset, running in 1 hour",
                        expression
                    ),
                    CronShape::Malformed => warn!(
                        "Cron expression '{}' does not have 5 fields, running in 60 seconds",
                        expression
                    ),
                    _ => {}
                }
                Some(shape.delay_from(now))
            }
            Trigger::Event { event } => Some(event_delay(*event, now)),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Manual => write!(f, "manual"),
            Trigger::Interval { milliseconds } => write!(f, "every {}ms", milliseconds),
            Trigger::Cron { expression } => write!(f, "cron '{}'", expression),
            Trigger::Event { event } => write!(f, "{} event", event),
        }
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronShape {
    /// `0 0 * * *`
    Midnight,
    /// `*/N * * * *`
    EveryMinutes(u32),
    /// `K * * * *`
    HourlyAt(u32),
    /// Five fields, but not one of the shapes above.
    Unsupported,
    /// Not five fields.
    Malformed,
}

impl CronShape {
    pub fn parse(expression: &str) -> Self {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return CronShape::Malformed;
        }

        let (minute, hour, rest) = (fields[0], fields[1], &fields[2..]);
        if !rest.iter().all(|f| *f == "*") {
            return CronShape::Unsupported;
        }

        if minute == "0" && hour == "0" {
            return CronShape::Midnight;
        }
        if hour != "*" {
            return CronShape::Unsupported;
        }

        if let Some(step) = minute.strip_prefix("*/") {
            return match step.parse::<u32>() {
                Ok(n) if (1..60).contains(&n) => CronShape::EveryMinutes(n),
                _ => CronShape::Unsupported,
            };
        }

        match minute.parse::<u32>() {
            Ok(k) if k < 60 => CronShape::HourlyAt(k),
            _ => CronShape::Unsupported,
        }
    }

    pub fn delay_from<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Duration {
        match self {
            CronShape::Midnight => until(now, next_midnight(now, 1)),
            CronShape::EveryMinutes(n) => {
                let minute = now.minute();
                let next = (minute / n + 1) * n;
                let target = minute_start(now)
                    .map(|base| base + ChronoDuration::minutes(i64::from(next.min(60) - minute)));
                until(now, target)
            }
            CronShape::HourlyAt(k) => {
                let minute = now.minute();
                let ahead = if minute < *k { k - minute } else { 60 - minute + k };
                let target =
                    minute_start(now).map(|base| base + ChronoDuration::minutes(i64::from(ahead)));
                until(now, target)
            }
            CronShape::Unsupported => UNSUPPORTED_CRON_DELAY,
            CronShape::Malformed => MALFORMED_CRON_DELAY,
        }
    }
}

/// Delay until the next calendar boundary for `event`.
pub fn event_delay<Tz: TimeZone>(event: CalendarEvent, now: &DateTime<Tz>) -> Duration {
    match event {
        CalendarEvent::Daily => until(now, next_midnight(now, 1)),
        CalendarEvent::Weekly => {
            let from_sunday = now.weekday().num_days_from_sunday() as i64;
            let days = match (8 - from_sunday) % 7 {
                0 => 7,
                d => d,
            };
            until(now, next_midnight(now, days))
        }
        CalendarEvent::Monthly => {
            let (year, month) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            let target = NaiveDate::from_ymd_opt(year, month, 1)
                .and_then(|d| local_midnight(&now.timezone(), d));
            until(now, target)
        }
    }
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
}

fn next_midnight<Tz: TimeZone>(now: &DateTime<Tz>, days: i64) -> Option<DateTime<Tz>> {
    let date = now.date_naive() + ChronoDuration::days(days);
    local_midnight(&now.timezone(), date)
}

fn minute_start<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    now.with_second(0).and_then(|t| t.with_nanosecond(0))
}

/// Falls back to one day when the target does not exist locally.
fn until<Tz: TimeZone>(now: &DateTime<Tz>, target: Option<DateTime<Tz>>) -> Duration {
    match target {
        Some(t) => (t - now.clone()).to_std().unwrap_or(Duration::ZERO),
        None => Duration::from_secs(24 * 60 * 60),
    }
}
