//! The downstream news store.
//!
//! [`Sink`] is the interface the pipeline calls; [`HttpSink`] talks to the
//! store's REST collection endpoint:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `create` | `POST {endpoint}` with a JSON [`NewsPayload`](crate::models::NewsPayload) |
//! | `delete_before` | `DELETE {endpoint}?time=<epoch millis>` |
//! | `query` | `GET {endpoint}?start=<epoch millis>&end=<epoch millis>` |
//!
//! The store performs no duplicate detection; a create is a raw insert.

use crate::error::SinkError;
use crate::models::{NewsRecord, StoredRecord};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist one record; the store assigns its id.
    async fn create(&self, record: &NewsRecord) -> Result<StoredRecord, SinkError>;

    /// Delete every record published at or before `cutoff`.
    async fn delete_before(&self, cutoff: DateTime<Local>) -> Result<(), SinkError>;

    /// Records published within `[start, end]`.
    async fn query(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<StoredRecord>, SinkError>;
}

/// REST client for the news store.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, SinkError> {
        let endpoint = Url::parse(endpoint).map_err(|e| SinkError::Endpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn delete_url(&self, cutoff: DateTime<Local>) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("time", &cutoff.timestamp_millis().to_string());
        url
    }

    pub fn query_url(&self, start: DateTime<Local>, end: DateTime<Local>) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("start", &start.timestamp_millis().to_string())
            .append_pair("end", &end.timestamp_millis().to_string());
        url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Status {
            status: status.as_u16(),
            body: truncate_for_log(&body, 300),
        })
    }
}

#[async_trait]
impl Sink for HttpSink {
    #[instrument(level = "debug", skip_all, fields(headline = %record.headline))]
    async fn create(&self, record: &NewsRecord) -> Result<StoredRecord, SinkError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&record.to_payload())
            .send()
            .await?;
        let stored: StoredRecord = Self::check(response).await?.json().await?;
        debug!(id = ?stored.id, "Stored news record");
        Ok(stored)
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_before(&self, cutoff: DateTime<Local>) -> Result<(), SinkError> {
        let response = self.client.delete(self.delete_url(cutoff)).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn query(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<StoredRecord>, SinkError> {
        let response = self.client.get(self.query_url(start, end)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Sink double that records every call.

    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        pub created: Mutex<Vec<NewsRecord>>,
        pub deletes: Mutex<Vec<DateTime<Local>>>,
        pub stored: Mutex<Vec<StoredRecord>>,
        /// Headlines whose create call answers HTTP 500.
        pub reject_headlines: HashSet<String>,
        /// Every call answers HTTP 503.
        pub unavailable: bool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn rejecting(headline: &str) -> Self {
            Self {
                reject_headlines: HashSet::from([headline.to_string()]),
                ..Self::default()
            }
        }

        pub fn unavailable() -> Self {
            Self {
                unavailable: true,
                ..Self::default()
            }
        }

        pub fn created_headlines(&self) -> Vec<String> {
            self.created
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.headline.clone())
                .collect()
        }

        fn down(&self) -> Result<(), SinkError> {
            if self.unavailable {
                return Err(SinkError::Status {
                    status: 503,
                    body: "maintenance".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn create(&self, record: &NewsRecord) -> Result<StoredRecord, SinkError> {
            self.down()?;
            if self.reject_headlines.contains(&record.headline) {
                return Err(SinkError::Status {
                    status: 500,
                    body: "constraint violation".to_string(),
                });
            }
            let mut created = self.created.lock().unwrap();
            created.push(record.clone());
            Ok(StoredRecord {
                id: Some(created.len() as i64),
                headline: record.headline.clone(),
                description: record.description.clone(),
                publication_time: record.publication_time.naive_local(),
            })
        }

        async fn delete_before(&self, cutoff: DateTime<Local>) -> Result<(), SinkError> {
            self.deletes.lock().unwrap().push(cutoff);
            self.down()
        }

        async fn query(
            &self,
            start: DateTime<Local>,
            end: DateTime<Local>,
        ) -> Result<Vec<StoredRecord>, SinkError> {
            self.down()?;
            Ok(self
                .stored
                .lock()
                .unwrap()
                .iter()
                .filter(|r| {
                    let t = r.publication_time_local();
                    t >= start && t <= end
                })
                .cloned()
                .collect())
        }
    }
}
