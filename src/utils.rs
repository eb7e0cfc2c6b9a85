//! Small helpers for local-time arithmetic and text cleanup.
//!
//! - Resolving a local calendar date and wall-clock time to an instant
//! - Collapsing whitespace in scraped text
//! - Truncating strings for logs and error messages

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Resolve a local date and time of day to an instant in the local timezone.
///
/// Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant.
/// Wall-clock times skipped by a DST jump are interpreted as UTC, which is
/// within an hour of the intended instant.
pub fn local_at(date: NaiveDate, time: NaiveTime) -> DateTime<Local> {
    local_from_naive(&date.and_time(time))
}

/// Interpret a naive date-time as local wall-clock time.
pub fn local_from_naive(naive: &NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(naive))
}

/// The first instant of the local calendar day containing `now`.
pub fn local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    local_at(now.date_naive(), NaiveTime::MIN)
}

/// Collapse every run of whitespace into one space and trim both ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (backing off to a char boundary) with
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}
