//! Command-line interface definitions for Daily News Ingest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! The config path and every override can also come from environment variables.

use crate::config::Overrides;
use crate::error::ConfigError;
use crate::scrapers::filter::{AcceptanceWindow, Edition};
use crate::utils::local_from_naive;
use chrono::{DateTime, Local, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for the Daily News Ingest application.
///
/// # Examples
///
/// ```sh
/// # Run both schedules until Ctrl-C
/// daily_news_ingest --config ./config.yaml
///
/// # One ingestion run for this morning's edition
/// daily_news_ingest ingest --window morning
///
/// # Point the store at another host for a single sweep
/// SINK_URL=http://store:8080/news daily_news_ingest sweep
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.yaml
    #[arg(short, long, env = "NEWS_INGEST_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Listing page to discover news items on
    #[arg(long, env = "LISTING_URL")]
    pub listing_url: Option<String>,

    /// News store collection endpoint
    #[arg(long, env = "SINK_URL")]
    pub sink_url: Option<String>,

    /// Cron expression for ingestion runs
    #[arg(long, env = "INGEST_CRON")]
    pub ingest_cron: Option<String>,

    /// Cron expression for retention sweeps
    #[arg(long, env = "RETENTION_CRON")]
    pub retention_cron: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the ingestion and retention schedules until interrupted (default)
    Run,
    /// Run one ingestion now and print its summary
    Ingest {
        #[arg(short, long, value_enum, default_value_t = WindowArg::Today)]
        window: WindowArg,
        /// Accept items published at or after this local time (overrides --window)
        #[arg(long)]
        since: Option<NaiveDateTime>,
        /// Accept items published at or before this local time
        #[arg(long, requires = "since")]
        until: Option<NaiveDateTime>,
    },
    /// Delete every stored record published up to now
    Sweep,
    /// Print stored records for a window of today
    Show {
        #[arg(short, long, value_enum, default_value_t = WindowArg::Today)]
        window: WindowArg,
    },
}

/// Named acceptance windows for the current local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WindowArg {
    Today,
    Morning,
    Afternoon,
    Evening,
}

impl WindowArg {
    pub fn window(self, now: DateTime<Local>) -> AcceptanceWindow {
        let edition = match self {
            WindowArg::Today => return AcceptanceWindow::since_local_midnight(now),
            WindowArg::Morning => Edition::Morning,
            WindowArg::Afternoon => Edition::Afternoon,
            WindowArg::Evening => Edition::Evening,
        };
        AcceptanceWindow::edition(now.date_naive(), edition)
    }
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            listing_url: self.listing_url.clone(),
            sink_url: self.sink_url.clone(),
            ingest_cron: self.ingest_cron.clone(),
            retention_cron: self.retention_cron.clone(),
        }
    }
}

/// The window an `ingest` invocation filters with.
///
/// An explicit `--since` wins over `--window`.
pub fn ingest_window(
    window: WindowArg,
    since: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
    now: DateTime<Local>,
) -> Result<AcceptanceWindow, ConfigError> {
    let Some(since) = since else {
        return Ok(window.window(now));
    };
    AcceptanceWindow::between(
        local_from_naive(&since),
        until.as_ref().map(local_from_naive),
    )
    .ok_or_else(|| ConfigError::Invalid(format!("--since {since} is after --until")))
}
