//! Scraping stages of an ingestion run.
//!
//! A run follows a two-phase pattern:
//!
//! 1. **Indexing**: resolve the listing page into detail-page URLs
//! 2. **Fetching**: scrape each detail page into a candidate record and filter it
//!
//! # Stages
//!
//! | Stage | Module | Failure handling |
//! |-------|--------|------------------|
//! | Page retrieval | [`fetcher`] | `FetchError` with URL and cause; transient failures retried |
//! | Listing discovery | [`listing`] | Fatal to the run |
//! | Item extraction | [`extractor`] | `Failed` / `Rejected` per item, never raises |
//! | Window filter | [`filter`] | `Rejected`, silent at item level |
//!
//! All selectors come from [`CompiledSelectors`](crate::config::CompiledSelectors),
//! compiled once and shared read-only across concurrent fetches.

pub mod extractor;
pub mod fetcher;
pub mod filter;
pub mod listing;
