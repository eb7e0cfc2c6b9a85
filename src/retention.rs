//! Retention sweep: drop every stored record published at or before now.
//!
//! The sweep issues exactly one delete call per invocation. Paging through
//! qualifying records is the store's business, and a failure is left for the
//! next scheduled tick.

use crate::error::{SinkError, SweepError};
use crate::sink::Sink;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, instrument};

pub struct Sweeper {
    sink: Arc<dyn Sink>,
    timeout: Duration,
}

impl Sweeper {
    pub fn new(sink: Arc<dyn Sink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Delete everything published at or before `now`.
    #[instrument(level = "info", skip_all, fields(now = %now.to_rfc3339()))]
    pub async fn sweep(&self, now: DateTime<Local>) -> Result<(), SweepError> {
        let t0 = Instant::now();
        let deleted = timeout(self.timeout, self.sink.delete_before(now))
            .await
            .unwrap_or_else(|_| Err(SinkError::Timeout(self.timeout)));

        match deleted {
            Ok(()) => {
                info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Retention sweep complete");
                Ok(())
            }
            Err(source) => {
                let e = SweepError { cutoff: now, source };
                error!(error = %e, "Retention sweep failed");
                Err(e)
            }
        }
    }
}
