use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use clap::ValueEnum;
use serde::Deserialize;

/// Rendered in place of a TAT figure when there is nothing to average
pub const NO_DATA: &str = "—";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d-%m-%Y %H:%M:%S",
];

/// Parses a feed timestamp into local wall-clock time.
///
/// Feed rows carry naive `YYYY-MM-DD HH:MM:SS` strings in the operators'
/// local time. Offset-bearing RFC 3339 strings are converted to local time,
/// and bare dates map to midnight. Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

pub fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

/// Compact TAT label: `45m`, `2.5h`, `1.2d`.
pub fn format_tat(minutes: Option<f64>) -> String {
    match minutes {
        Some(m) if m > 0.0 => {
            if m < 60.0 {
                format!("{}m", m.round() as i64)
            } else if m < 60.0 * 24.0 {
                format!("{:.1}h", m / 60.0)
            } else {
                format!("{:.1}d", m / (60.0 * 24.0))
            }
        }
        _ => NO_DATA.to_string(),
    }
}

/// Duration label used in per-user history: `2h 30m`.
pub fn format_duration(from: NaiveDateTime, to: NaiveDateTime) -> String {
    let mins = (to - from).num_minutes();
    format!("{}h {}m", mins / 60, mins % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    Today,
    Yesterday,
    #[value(name = "last7days")]
    Last7Days,
    #[value(name = "last30days")]
    Last30Days,
    All,
}

impl DateRange {
    /// Inclusive bounds on the local calendar. `All` is unbounded.
    pub fn bounds(self, today: NaiveDate) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        let start_of = |d: NaiveDate| d.and_time(NaiveTime::MIN);
        let end_of = end_of_day;

        match self {
            DateRange::Today => (Some(start_of(today)), Some(end_of(today))),
            DateRange::Yesterday => {
                let y = today - Duration::days(1);
                (Some(start_of(y)), Some(end_of(y)))
            }
            DateRange::Last7Days => (Some(start_of(today - Duration::days(6))), Some(end_of(today))),
            DateRange::Last30Days => (Some(start_of(today - Duration::days(29))), Some(end_of(today))),
            DateRange::All => (None, None),
        }
    }
}

/// Last millisecond of `date`, the inclusive upper bound of a calendar day.
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::milliseconds(1)
}

/// Parses an upper date bound. A bare date covers the whole of that day.
pub fn parse_upper_bound(raw: &str) -> Option<NaiveDateTime> {
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => Some(end_of_day(date)),
        Err(_) => parse_timestamp(raw),
    }
}

pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}
