//! Data models for scraped news items and run results.
//!
//! - [`NewsRecord`]: a validated news item ready for the news store
//! - [`StoredRecord`]: a record as the news store returns it, with its id
//! - [`ExtractionOutcome`]: the per-item result of scraping one detail page
//! - [`IngestionReport`]: the aggregate result of one ingestion run
//!
//! The wire types use camelCase field names to match the news store's JSON.

use crate::error::{DeliveryError, FetchError};
use crate::utils::local_from_naive;
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated news item.
///
/// Constructed fresh from fetched HTML on every run, never mutated, and
/// handed to the news store at most once per run. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsRecord {
    /// Headline text; never empty.
    pub headline: String,
    /// Description text; never empty.
    pub description: String,
    /// Publication instant, normalized to the local timezone.
    pub publication_time: DateTime<Local>,
}

impl NewsRecord {
    /// Body of the news store's create call.
    pub fn to_payload(&self) -> NewsPayload<'_> {
        NewsPayload {
            headline: &self.headline,
            description: &self.description,
            publication_time: self.publication_time.naive_local(),
        }
    }
}

/// JSON body of a create call: publication time as local wall-clock time
/// without an offset, e.g. `2026-10-19T09:00:00`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPayload<'a> {
    pub headline: &'a str,
    pub description: &'a str,
    pub publication_time: NaiveDateTime,
}

/// A news item as persisted by the news store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: Option<i64>,
    pub headline: String,
    pub description: String,
    pub publication_time: NaiveDateTime,
}

impl StoredRecord {
    pub fn publication_time_local(&self) -> DateTime<Local> {
        local_from_naive(&self.publication_time)
    }
}

/// Why a candidate item was dropped. Normal filtering, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Headline, description or timestamp came back empty.
    MissingField(&'static str),
    /// The timestamp attribute was present but not an offset-aware date-time.
    BadTimestamp(String),
    /// Well-formed, but published outside the acceptance window.
    OutsideWindow,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingField(field) => write!(f, "missing field ({field})"),
            RejectReason::BadTimestamp(raw) => write!(f, "bad timestamp ({raw:?})"),
            RejectReason::OutsideWindow => f.write_str("outside window"),
        }
    }
}

/// Result of scraping one detail page.
#[derive(Debug)]
pub enum ExtractionOutcome {
    Accepted(NewsRecord),
    Rejected(RejectReason),
    Failed(FetchError),
}

/// Where in the pipeline an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch,
    Delivery,
}

/// Error detail of an [`ItemFailure`].
#[derive(Debug)]
pub enum ItemError {
    Fetch(FetchError),
    Delivery(DeliveryError),
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemError::Fetch(e) => e.fmt(f),
            ItemError::Delivery(e) => e.fmt(f),
        }
    }
}

/// One item that failed during a run, with the detail URL it came from.
#[derive(Debug)]
pub struct ItemFailure {
    pub url: String,
    pub error: ItemError,
}

impl ItemFailure {
    pub fn stage(&self) -> FailureStage {
        match self.error {
            ItemError::Fetch(_) => FailureStage::Fetch,
            ItemError::Delivery(_) => FailureStage::Delivery,
        }
    }
}

/// Aggregate result of one ingestion run.
///
/// `accepted` holds every record that passed validation and the window
/// filter and was not a duplicate, whether or not delivery then succeeded;
/// delivery failures are listed in `failed` with [`FailureStage::Delivery`].
/// Entry order is not significant.
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub accepted: Vec<NewsRecord>,
    pub rejected: usize,
    pub failed: Vec<ItemFailure>,
    /// Records the news store confirmed.
    pub delivered: usize,
    /// Records skipped because an earlier run already delivered them.
    pub duplicates: usize,
    /// Items not attempted because the run was cancelled.
    pub cancelled: usize,
}

impl IngestionReport {
    pub fn failed_at(&self, stage: FailureStage) -> usize {
        self.failed.iter().filter(|f| f.stage() == stage).count()
    }
}

impl fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} rejected={} failed={} delivered={} duplicates={} cancelled={}",
            self.accepted.len(),
            self.rejected,
            self.failed.len(),
            self.delivered,
            self.duplicates,
            self.cancelled
        )
    }
}
