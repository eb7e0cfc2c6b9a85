//! Cron-driven periodic triggers.
//!
//! Each [`ScheduledJob`] gets its own task that sleeps until the next fire
//! time of its cron schedule and then runs the job to completion. A trigger
//! never overlaps itself: the next fire time is computed only after the
//! current run returns, and fire times missed meanwhile are skipped.
//!
//! A run that returns an error or panics is logged; the trigger keeps going.
//! Cancelling the token stops a trigger at its next sleep.

use crate::ingest::Ingestor;
use crate::retention::Sweeper;
use crate::scrapers::filter::AcceptanceWindow;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use cron::Schedule;
use std::error::Error;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub type JobError = Box<dyn Error + Send + Sync>;

/// Work executed on every tick of a trigger.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One run. The returned string summarises it for the log.
    async fn tick(&self, cancel: CancellationToken) -> Result<String, JobError>;
}

/// Ingest with the "since local midnight" window.
pub struct IngestJob(pub Arc<Ingestor>);

#[async_trait]
impl ScheduledJob for IngestJob {
    fn name(&self) -> &'static str {
        "ingest"
    }

    async fn tick(&self, cancel: CancellationToken) -> Result<String, JobError> {
        let window = AcceptanceWindow::since_local_midnight(Local::now());
        let report = self.0.run(&window, &cancel).await?;
        Ok(format!("{report} remembered={}", self.0.ledger().len()))
    }
}

/// Sweep everything published up to the current instant.
pub struct SweepJob(pub Arc<Sweeper>);

#[async_trait]
impl ScheduledJob for SweepJob {
    fn name(&self) -> &'static str {
        "retention"
    }

    async fn tick(&self, _cancel: CancellationToken) -> Result<String, JobError> {
        let now = Local::now();
        self.0.sweep(now).await?;
        Ok(format!("deleted records up to {}", now.to_rfc3339()))
    }
}

/// The first fire time strictly after both `now` and the previous fire time.
pub fn next_fire(
    schedule: &Schedule,
    now: DateTime<Local>,
    last: Option<DateTime<Local>>,
) -> Option<DateTime<Local>> {
    let from = match last {
        Some(last) if last > now => last,
        _ => now,
    };
    schedule.after(&from).next()
}

/// Spawn a trigger task running `job` on `schedule` until `cancel` fires.
pub fn spawn<J>(schedule: Schedule, job: J, cancel: CancellationToken) -> JoinHandle<()>
where
    J: ScheduledJob,
{
    let job = Arc::new(job);
    tokio::spawn(async move { trigger_loop(schedule, job, cancel).await })
}

#[instrument(level = "info", skip_all, fields(job = job.name()))]
async fn trigger_loop<J>(schedule: Schedule, job: Arc<J>, cancel: CancellationToken)
where
    J: ScheduledJob,
{
    let mut last = None;
    loop {
        let now = Local::now();
        let Some(next) = next_fire(&schedule, now, last) else {
            warn!("Schedule has no upcoming fire time; trigger stopped");
            return;
        };
        let delay = (next - now).to_std().unwrap_or_default();
        info!(next = %next.to_rfc3339(), "Next run scheduled");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Trigger cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        last = Some(next);

        // A separate task turns a panicking run into a JoinError instead of killing the trigger.
        let run = {
            let job = Arc::clone(&job);
            let cancel = cancel.clone();
            tokio::spawn(async move { job.tick(cancel).await })
        };
        match run.await {
            Ok(Ok(summary)) => info!(%summary, "Scheduled run finished"),
            Ok(Err(e)) => error!(error = %e, "Scheduled run failed; retrying on next tick"),
            Err(e) => error!(error = %e, "Scheduled run panicked; retrying on next tick"),
        }
    }
}
