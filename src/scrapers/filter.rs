//! Acceptance windows and the time-window filter.
//!
//! A window is a closed interval `[start, end]` of local instants; `end` may
//! be open. The scheduled run uses [`AcceptanceWindow::since_local_midnight`];
//! the editions below cover fixed parts of the local day:
//!
//! - **Morning**: 00:00 - 11:59:59.999…
//! - **Afternoon**: 12:00 - 17:59:59.999…
//! - **Evening**: 18:00 - 23:59:59.999…

use crate::models::NewsRecord;
use crate::utils::{local_at, local_midnight};
use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use std::fmt;

/// A fixed part of a local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edition {
    Morning,
    Afternoon,
    Evening,
}

impl Edition {
    fn bounds(self) -> (NaiveTime, NaiveTime) {
        let start = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
        let end = |h| NaiveTime::from_hms_nano_opt(h, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
        match self {
            Edition::Morning => (start(0), end(11)),
            Edition::Afternoon => (start(12), end(17)),
            Edition::Evening => (start(18), end(23)),
        }
    }

    /// The edition a local instant falls in.
    pub fn containing(time: DateTime<Local>) -> Self {
        [Edition::Morning, Edition::Afternoon]
            .into_iter()
            .find(|edition| time.time() <= edition.bounds().1)
            .unwrap_or(Edition::Evening)
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Edition::Morning => "morning",
            Edition::Afternoon => "afternoon",
            Edition::Evening => "evening",
        })
    }
}

/// The `[start, end]` range a record's publication time must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptanceWindow {
    pub start: DateTime<Local>,
    /// `None` leaves the window open towards the future.
    pub end: Option<DateTime<Local>>,
}

impl AcceptanceWindow {
    /// Published at or after local midnight of `now`'s day.
    pub fn since_local_midnight(now: DateTime<Local>) -> Self {
        Self {
            start: local_midnight(now),
            end: None,
        }
    }

    /// One edition of a local calendar day.
    pub fn edition(date: NaiveDate, edition: Edition) -> Self {
        let (start, end) = edition.bounds();
        Self {
            start: local_at(date, start),
            end: Some(local_at(date, end)),
        }
    }

    /// An explicit window. `None` when `end` precedes `start`.
    pub fn between(start: DateTime<Local>, end: Option<DateTime<Local>>) -> Option<Self> {
        match end {
            Some(end) if end < start => None,
            _ => Some(Self { start, end }),
        }
    }

    /// Whether `time` lies in the window, both ends inclusive.
    pub fn contains(&self, time: DateTime<Local>) -> bool {
        time >= self.start && self.end.is_none_or(|end| time <= end)
    }

    /// Whether `record` passes the window filter.
    pub fn accept(&self, record: &NewsRecord) -> bool {
        self.contains(record.publication_time)
    }
}

impl fmt::Display for AcceptanceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {}]", self.start.to_rfc3339(), end.to_rfc3339()),
            None => write!(f, "[{}, ..)", self.start.to_rfc3339()),
        }
    }
}
