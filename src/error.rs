//! Error types for the ingestion pipeline.
//!
//! The taxonomy mirrors how failures propagate through a run:
//!
//! - [`FetchError`]: a page could not be retrieved (transport, HTTP status, timeout).
//!   Fatal to the run for the listing page, isolated per item for detail pages.
//! - [`SinkError`]: the downstream news store rejected a call or was unreachable.
//! - [`DeliveryError`]: a [`SinkError`] attached to the record it failed to deliver.
//! - [`SweepError`]: the retention sweep's single delete call failed.
//! - [`RunError`]: the reasons a whole ingestion run is abandoned.
//! - [`ConfigError`]: anything wrong with the configuration file or overrides.
//!
//! Missing fields and unparseable timestamps are *not* errors; they are
//! [`RejectReason`](crate::models::RejectReason)s.

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to retrieve a page from the source site.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("timed out after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },
}

impl FetchError {
    /// The URL the failed request targeted.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Timeout { url, .. } => url,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Failure of a call to the downstream news store.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("news store unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("news store responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("news store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid news store endpoint {endpoint}: {reason}")]
    Endpoint { endpoint: String, reason: String },
}

/// A record that could not be handed to the news store.
#[derive(Debug, Error)]
#[error("failed to deliver {headline:?}: {source}")]
pub struct DeliveryError {
    pub headline: String,
    #[source]
    pub source: SinkError,
}

/// The retention sweep's delete call failed.
#[derive(Debug, Error)]
#[error("retention sweep up to {cutoff} failed: {source}")]
pub struct SweepError {
    pub cutoff: DateTime<Local>,
    #[source]
    pub source: SinkError,
}

/// Reasons a whole ingestion run is abandoned.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("listing page unavailable: {0}")]
    Listing(#[from] FetchError),
}

/// Problems with the configuration file or its overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid URL for {field} ({value}): {source}")]
    Url {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("selector {field} ({selector:?}) does not compile: {reason}")]
    Selector {
        field: &'static str,
        selector: String,
        reason: String,
    },
    #[error("cron expression for {field} ({expr:?}) is invalid: {reason}")]
    Cron {
        field: &'static str,
        expr: String,
        reason: String,
    },
    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_are_transient_only_for_server_side_codes() {
        let status = |status| FetchError::Status {
            url: "https://news.example/a".into(),
            status,
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
    }

    #[test]
    fn fetch_error_keeps_url() {
        let err = FetchError::Timeout {
            url: "https://news.example/slow".into(),
            timeout: Duration::from_secs(3),
        };
        assert_eq!(err.url(), "https://news.example/slow");
        assert!(err.to_string().contains("https://news.example/slow"));
    }
}
