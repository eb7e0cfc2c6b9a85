//! Detail page extraction.
//!
//! Turns one detail page into an [`ExtractionOutcome`]:
//!
//! - fetch failure → `Failed`
//! - headline, description or timestamp empty → `Rejected(MissingField)`
//! - timestamp not an offset-aware date-time → `Rejected(BadTimestamp)`
//! - otherwise → `Accepted` with the timestamp converted to local time
//!
//! Malformed detail pages are expected in normal operation, so nothing here
//! is an error beyond the fetch itself.

use crate::config::CompiledSelectors;
use crate::models::{ExtractionOutcome, NewsRecord, RejectReason};
use crate::scrapers::fetcher::{Document, DocumentFetcher};
use chrono::{DateTime, FixedOffset, Local};
use tracing::instrument;

/// Fetch the detail page at `url` and extract a candidate record.
#[instrument(level = "debug", skip(fetcher, selectors))]
pub async fn extract(
    url: &str,
    fetcher: &dyn DocumentFetcher,
    selectors: &CompiledSelectors,
) -> ExtractionOutcome {
    match fetcher.fetch(url).await {
        Ok(document) => extract_from_document(&document, selectors),
        Err(e) => ExtractionOutcome::Failed(e),
    }
}

/// Extract a candidate record from an already fetched detail page.
pub fn extract_from_document(
    document: &Document,
    selectors: &CompiledSelectors,
) -> ExtractionOutcome {
    let headline = document.text_of(&selectors.headline);
    let description = document.text_of(&selectors.description);
    let raw_time = document.attr_of(
        &selectors.publication_time,
        &selectors.publication_time_attribute,
    );

    let missing = [
        ("headline", &headline),
        ("description", &description),
        ("publication time", &raw_time),
    ]
    .into_iter()
    .find(|(_, value)| value.is_empty());
    if let Some((field, _)) = missing {
        return ExtractionOutcome::Rejected(RejectReason::MissingField(field));
    }

    match parse_publication_time(&raw_time) {
        Some(publication_time) => ExtractionOutcome::Accepted(NewsRecord {
            headline,
            description,
            publication_time,
        }),
        None => ExtractionOutcome::Rejected(RejectReason::BadTimestamp(raw_time)),
    }
}

/// Parse an offset-aware timestamp and convert it to local time.
///
/// Accepts RFC 3339 and the ISO-8601 offset form without seconds
/// (`2026-10-19T09:00+03:00`). Timestamps without an offset are refused.
pub fn parse_publication_time(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| {
            let with_offset = match raw.strip_suffix(['Z', 'z']) {
                Some(prefix) => format!("{prefix}+00:00"),
                None => raw.to_string(),
            };
            DateTime::<FixedOffset>::parse_from_str(&with_offset, "%Y-%m-%dT%H:%M%:z")
        })
        .ok()
        .map(|time| time.with_timezone(&Local))
}
