//! Page retrieval and the queryable document it produces.
//!
//! [`DocumentFetcher`] is the pipeline's only point of network I/O against the
//! source site. [`HttpFetcher`] implements it with a shared `reqwest` client;
//! [`RetryFetch`] wraps any fetcher with bounded retries for transient
//! failures.
//!
//! # Retry Strategy
//!
//! - Only transport errors, timeouts, HTTP 429 and 5xx are retried
//! - Exponential backoff from the configured base delay, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::error::FetchError;
use async_trait::async_trait;
use rand::{Rng, rng};
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::utils::collapse_whitespace;

/// A parsed HTML page.
///
/// HTML parsing is lenient: malformed markup still yields a tree, so a
/// document only ever comes from a successfully retrieved body.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    /// All nodes matching `selector`, in document order.
    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.html.select(selector)
    }

    /// Combined text of every node matching `selector`.
    ///
    /// Each node's text is whitespace-collapsed; non-empty pieces are joined
    /// with one space. Empty when nothing matches.
    pub fn text_of(&self, selector: &Selector) -> String {
        self.select(selector)
            .map(|element| collapse_whitespace(&element.text().collect::<String>()))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Value of `attribute` on the first matching node that carries it.
    pub fn attr_of(&self, selector: &Selector, attribute: &str) -> String {
        self.select(selector)
            .find_map(|element| element.value().attr(attribute))
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document").finish_non_exhaustive()
    }
}

/// Retrieves a page by URL and parses it.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError>;
}

/// Plain HTTP GET with the client's default redirect and charset handling.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    fn transport_error(&self, url: &str, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(url, e))?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(Document::parse(&body))
    }
}

const MAX_JITTER_MS: u64 = 250;
const MAX_BACKOFF_SHIFT: usize = 16;

/// Wrapper that adds exponential backoff retry logic to any [`DocumentFetcher`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: DocumentFetcher,
{
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Backoff before retry `attempt` (1-based), without jitter.
    fn base_backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT) as u32;
        self.base_delay.saturating_mul(1 << shift).min(self.max_delay)
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let jitter_ms: u64 = rng().random_range(0..=MAX_JITTER_MS);
        self.base_backoff(attempt) + Duration::from_millis(jitter_ms)
    }

    /// Longest a fetch can take when every attempt runs for `per_attempt`:
    /// all attempts plus every backoff at maximum jitter. Saturates instead
    /// of overflowing.
    pub fn time_budget(&self, per_attempt: Duration) -> Duration {
        let attempts = u32::try_from(self.max_retries.saturating_add(1)).unwrap_or(u32::MAX);
        let mut budget = per_attempt.saturating_mul(attempts);

        // Past MAX_BACKOFF_SHIFT every retry waits the same.
        let distinct = self.max_retries.min(MAX_BACKOFF_SHIFT + 1);
        for attempt in 1..=distinct {
            budget = budget.saturating_add(self.base_backoff(attempt));
        }
        let repeated = u32::try_from(self.max_retries - distinct).unwrap_or(u32::MAX);
        budget = budget.saturating_add(
            self.base_backoff(distinct.max(1)).saturating_mul(repeated),
        );

        let retries = u32::try_from(self.max_retries).unwrap_or(u32::MAX);
        budget.saturating_add(Duration::from_millis(MAX_JITTER_MS).saturating_mul(retries))
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> DocumentFetcher for RetryFetch<T>
where
    T: DocumentFetcher,
{
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        let mut attempt = 0usize;
        loop {
            // The parsed document is not Send; it must not be alive across the sleep below.
            let e = match self.inner.fetch(url).await {
                Ok(document) => return Ok(document),
                Err(e) => e,
            };
            if !e.is_transient() {
                return Err(e);
            }

            attempt += 1;
            if attempt > self.max_retries {
                error!(%url, attempt, max = self.max_retries, error = %e, "fetch exhausted retries");
                return Err(e);
            }
            let delay = self.backoff(attempt);
            warn!(%url, attempt, max = self.max_retries, ?delay, error = %e, "fetch attempt failed; backing off");
            sleep(delay).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticFetcher;
    use super::*;

    fn selector(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    #[test]
    fn test_text_of_joins_matches_and_collapses_whitespace() {
        let doc = Document::parse(
            "<div class='body'><p>  First\n  paragraph </p><p></p><p>Second</p></div>",
        );
        assert_eq!(doc.text_of(&selector(".body p")), "First paragraph Second");
    }

    #[test]
    fn test_text_of_nothing_matching_is_empty() {
        let doc = Document::parse("<h1>Title</h1>");
        assert_eq!(doc.text_of(&selector(".missing")), "");
    }

    #[test]
    fn test_attr_of_takes_first_node_carrying_attribute() {
        let doc = Document::parse(
            "<time class='t'>no attr</time><time class='t' datetime=' 2026-10-19T09:00:00+00:00 '>x</time>",
        );
        assert_eq!(
            doc.attr_of(&selector("time.t"), "datetime"),
            "2026-10-19T09:00:00+00:00"
        );
        assert_eq!(doc.attr_of(&selector("time.t"), "data-missing"), "");
    }

    #[test]
    fn test_malformed_markup_still_parses() {
        let doc = Document::parse("<h1>Unclosed <b>bold</h1><p>para");
        assert_eq!(doc.text_of(&selector("h1")), "Unclosed bold");
        assert_eq!(doc.text_of(&selector("p")), "para");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_retries_on_server_errors() {
        let fetcher = RetryFetch::new(
            StaticFetcher::new().status("https://news.example/a", 503),
            2,
            Duration::from_millis(100),
        );
        let err = fetcher.fetch("https://news.example/a").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert_eq!(fetcher.inner.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_repeat_client_errors() {
        let fetcher = RetryFetch::new(
            StaticFetcher::new().status("https://news.example/a", 404),
            5,
            Duration::from_millis(100),
        );
        assert!(fetcher.fetch("https://news.example/a").await.is_err());
        assert_eq!(fetcher.inner.call_count(), 1);
    }

    #[test]
    fn test_time_budget_covers_every_attempt_backoff_and_jitter() {
        let fetcher = RetryFetch::new(StaticFetcher::new(), 2, Duration::from_millis(500));
        // 3 attempts + 500ms + 1s backoff + 2 * 250ms jitter
        assert_eq!(
            fetcher.time_budget(Duration::from_secs(10)),
            Duration::from_millis(32_000)
        );

        let no_retries = RetryFetch::new(StaticFetcher::new(), 0, Duration::from_millis(500));
        assert_eq!(no_retries.time_budget(Duration::from_secs(10)), Duration::from_secs(10));
    }

    #[test]
    fn test_time_budget_caps_backoff_at_max_delay() {
        let fetcher = RetryFetch::new(StaticFetcher::new(), 20, Duration::from_secs(1));
        // 1+2+4+8+16, then 15 retries capped at 30s
        let backoff = Duration::from_secs(31 + 15 * 30);
        let jitter = Duration::from_millis(20 * 250);
        assert_eq!(
            fetcher.time_budget(Duration::from_secs(1)),
            Duration::from_secs(21) + backoff + jitter
        );
    }

    #[test]
    fn test_time_budget_saturates_on_huge_config() {
        let fetcher = RetryFetch::new(StaticFetcher::new(), usize::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(fetcher.time_budget(Duration::from_secs(u64::MAX / 2)), Duration::MAX);
    }

    #[tokio::test]
    async fn test_retry_passes_success_through() {
        let fetcher = RetryFetch::new(
            StaticFetcher::new().page("https://news.example/a", "<h1>Hi</h1>"),
            2,
            Duration::from_millis(100),
        );
        let doc = fetcher.fetch("https://news.example/a").await.unwrap();
        assert_eq!(doc.text_of(&selector("h1")), "Hi");
        assert_eq!(fetcher.inner.call_count(), 1);
    }
}
