//! Ingestion orchestrator.
//!
//! One run:
//!
//! 1. Resolve the listing page (a failure here abandons the run)
//! 2. Scrape every detail page, `max_concurrency` at a time
//! 3. Filter candidates through the acceptance window
//! 4. Deliver accepted records to the [`Sink`] one at a time
//!
//! Every item is isolated: a fetch failure, timeout, or rejected delivery is
//! recorded in the [`IngestionReport`] and the run carries on. Cancellation is
//! checked between items, never mid-fetch; records already delivered stay
//! delivered.

use crate::config::CompiledSelectors;
use crate::error::{DeliveryError, FetchError, RunError, SinkError};
use crate::models::{
    ExtractionOutcome, FailureStage, IngestionReport, ItemError, ItemFailure, NewsRecord, RejectReason,
};
use crate::scrapers::extractor;
use crate::scrapers::fetcher::DocumentFetcher;
use crate::scrapers::filter::AcceptanceWindow;
use crate::scrapers::listing;
use crate::sink::Sink;
use crate::utils::local_midnight;
use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Tuning for one [`Ingestor`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Detail pages fetched at once.
    pub max_concurrency: usize,
    /// Upper bound on one page fetch, retries included.
    pub fetch_timeout: Duration,
    /// Upper bound on one call to the sink.
    pub sink_timeout: Duration,
    /// Remember delivered records and skip them on later runs.
    pub dedup: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            fetch_timeout: Duration::from_secs(30),
            sink_timeout: Duration::from_secs(10),
            dedup: true,
        }
    }
}

/// Records this process has already delivered, keyed by detail URL and
/// publication time. A republished item with a new timestamp is delivered again.
#[derive(Debug, Default)]
pub struct DeliveryLedger {
    delivered: Mutex<HashSet<(String, DateTime<Local>)>>,
}

impl DeliveryLedger {
    pub fn contains(&self, url: &str, publication_time: DateTime<Local>) -> bool {
        self.lock().contains(&(url.to_string(), publication_time))
    }

    pub fn insert(&self, url: &str, publication_time: DateTime<Local>) {
        self.lock().insert((url.to_string(), publication_time));
    }

    /// Forget records published before `cutoff`.
    ///
    /// Runs prune at local midnight of their window's day rather than at the
    /// window start, so a narrow edition window never drops entries a later
    /// whole-day window still needs.
    pub fn prune_before(&self, cutoff: DateTime<Local>) {
        self.lock().retain(|(_, time)| *time >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<(String, DateTime<Local>)>> {
        // A poisoning panic cannot leave the set half-updated.
        self.delivered.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Per-URL result of the scraping phase.
enum ItemOutcome {
    Accepted { url: String, record: NewsRecord },
    Rejected { url: String, reason: RejectReason },
    Failed { url: String, error: FetchError },
    Cancelled,
}

/// Runs the ingestion pipeline against one source site and one sink.
pub struct Ingestor {
    fetcher: Arc<dyn DocumentFetcher>,
    sink: Arc<dyn Sink>,
    selectors: Arc<CompiledSelectors>,
    options: IngestOptions,
    ledger: DeliveryLedger,
}

impl Ingestor {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        sink: Arc<dyn Sink>,
        selectors: Arc<CompiledSelectors>,
        options: IngestOptions,
    ) -> Self {
        Self {
            fetcher,
            sink,
            selectors,
            options,
            ledger: DeliveryLedger::default(),
        }
    }

    pub fn ledger(&self) -> &DeliveryLedger {
        &self.ledger
    }

    /// Execute one run for `window`.
    ///
    /// Only a listing failure is an `Err`; everything item-level lands in the report.
    #[instrument(level = "info", skip_all, fields(%window))]
    pub async fn run(
        &self,
        window: &AcceptanceWindow,
        cancel: &CancellationToken,
    ) -> Result<IngestionReport, RunError> {
        let t0 = Instant::now();
        let urls = self.discover().await?;
        let total = urls.len();

        let outcomes: Vec<ItemOutcome> = stream::iter(urls)
            .map(|url| self.scrape(url, window, cancel))
            .buffer_unordered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        let mut report = IngestionReport::default();
        let mut to_deliver = Vec::new();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Accepted { url, record } => to_deliver.push((url, record)),
                ItemOutcome::Rejected { url, reason } => {
                    debug!(%url, %reason, "Rejected news item");
                    report.rejected += 1;
                }
                ItemOutcome::Failed { url, error } => {
                    warn!(%url, error = %error, "News item failed");
                    report.failed.push(ItemFailure {
                        url,
                        error: ItemError::Fetch(error),
                    });
                }
                ItemOutcome::Cancelled => report.cancelled += 1,
            }
        }

        self.deliver(to_deliver, window, cancel, &mut report).await;

        info!(
            total,
            accepted = report.accepted.len(),
            rejected = report.rejected,
            fetch_failed = report.failed_at(FailureStage::Fetch),
            delivery_failed = report.failed_at(FailureStage::Delivery),
            delivered = report.delivered,
            duplicates = report.duplicates,
            cancelled = report.cancelled,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Ingestion run complete"
        );
        Ok(report)
    }

    async fn discover(&self) -> Result<Vec<String>, RunError> {
        let listing_url = self.selectors.listing_url.as_str();
        let discovered = timeout(
            self.options.fetch_timeout,
            listing::discover(self.fetcher.as_ref(), &self.selectors),
        )
        .await
        .unwrap_or_else(|_| {
            Err(FetchError::Timeout {
                url: listing_url.to_string(),
                timeout: self.options.fetch_timeout,
            })
        });
        discovered.map_err(|e| {
            error!(url = %e.url(), error = %e, "Listing page unavailable; abandoning run");
            RunError::Listing(e)
        })
    }

    async fn scrape(
        &self,
        url: String,
        window: &AcceptanceWindow,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        if cancel.is_cancelled() {
            return ItemOutcome::Cancelled;
        }
        let extracted = timeout(
            self.options.fetch_timeout,
            extractor::extract(&url, self.fetcher.as_ref(), &self.selectors),
        )
        .await;
        match extracted {
            Err(_) => ItemOutcome::Failed {
                error: FetchError::Timeout {
                    url: url.clone(),
                    timeout: self.options.fetch_timeout,
                },
                url,
            },
            Ok(ExtractionOutcome::Failed(error)) => ItemOutcome::Failed { url, error },
            Ok(ExtractionOutcome::Rejected(reason)) => ItemOutcome::Rejected { url, reason },
            Ok(ExtractionOutcome::Accepted(record)) if !window.accept(&record) => {
                ItemOutcome::Rejected {
                    url,
                    reason: RejectReason::OutsideWindow,
                }
            }
            Ok(ExtractionOutcome::Accepted(record)) => ItemOutcome::Accepted { url, record },
        }
    }

    async fn deliver(
        &self,
        records: Vec<(String, NewsRecord)>,
        window: &AcceptanceWindow,
        cancel: &CancellationToken,
        report: &mut IngestionReport,
    ) {
        if self.options.dedup {
            self.ledger.prune_before(local_midnight(window.start));
        }

        for (url, record) in records {
            if cancel.is_cancelled() {
                report.cancelled += 1;
                continue;
            }
            if self.options.dedup && self.ledger.contains(&url, record.publication_time) {
                debug!(%url, "Already delivered; skipping");
                report.duplicates += 1;
                continue;
            }

            let created = timeout(self.options.sink_timeout, self.sink.create(&record))
                .await
                .unwrap_or_else(|_| Err(SinkError::Timeout(self.options.sink_timeout)));
            match created {
                Ok(stored) => {
                    debug!(%url, id = ?stored.id, "Delivered news record");
                    if self.options.dedup {
                        self.ledger.insert(&url, record.publication_time);
                    }
                    report.delivered += 1;
                }
                Err(source) => {
                    let error = DeliveryError {
                        headline: record.headline.clone(),
                        source,
                    };
                    warn!(%url, error = %error, "Delivery failed");
                    report.failed.push(ItemFailure {
                        url,
                        error: ItemError::Delivery(error),
                    });
                }
            }
            report.accepted.push(record);
        }
    }
}
