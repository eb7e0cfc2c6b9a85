//! # Daily News Ingest
//!
//! A scheduled scraper that collects today's short news items from a news
//! site, forwards them to a REST news store, and periodically sweeps stale
//! records out of that store.
//!
//! ## Usage
//!
//! ```sh
//! daily_news_ingest --config config.yaml          # run both schedules
//! daily_news_ingest ingest --window afternoon     # one run now
//! daily_news_ingest sweep                         # one retention sweep now
//! daily_news_ingest show                          # print today's stored news
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: resolve detail-page links from the listing page
//! 2. **Extraction**: fetch detail pages in parallel and pull out the fields
//! 3. **Filtering**: keep items published inside the acceptance window
//! 4. **Delivery**: hand each accepted record to the news store
//! 5. **Retention**: on a separate schedule, delete records up to now

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod ingest;
mod models;
mod retention;
mod scheduler;
mod scrapers;
mod sink;
mod utils;

use cli::{Cli, Command, WindowArg};
use config::{AppConfig, CompiledSelectors};
use ingest::{IngestOptions, Ingestor};
use retention::Sweeper;
use scheduler::{IngestJob, SweepJob};
use scrapers::fetcher::{HttpFetcher, RetryFetch};
use scrapers::filter::Edition;
use sink::{HttpSink, Sink};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(config = %args.config, command = ?args.command, "Parsed CLI arguments");

    let config = AppConfig::load(&args.config, &args.overrides()).inspect_err(|e| {
        error!(error = %e, "Invalid configuration; nothing scheduled");
    })?;

    let sink: Arc<dyn Sink> = Arc::new(HttpSink::new(&config.sink.url, config.sink.timeout())?);
    let sweeper = Arc::new(Sweeper::new(Arc::clone(&sink), config.sink.timeout()));

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let ingestor = Arc::new(build_ingestor(&config, Arc::clone(&sink))?);
            run_schedules(&config, ingestor, sweeper).await?;
        }
        Command::Ingest {
            window,
            since,
            until,
        } => {
            let ingestor = build_ingestor(&config, sink)?;
            let window = cli::ingest_window(window, since, until, Local::now())?;
            let report = ingestor.run(&window, &CancellationToken::new()).await?;
            println!("{report}");
            for failure in &report.failed {
                println!("  failed {}: {}", failure.url, failure.error);
            }
        }
        Command::Sweep => {
            sweeper.sweep(Local::now()).await?;
        }
        Command::Show { window } => {
            show(sink.as_ref(), window).await?;
        }
    }

    Ok(())
}

fn build_ingestor(config: &AppConfig, sink: Arc<dyn Sink>) -> Result<Ingestor, Box<dyn Error>> {
    let selectors = Arc::new(CompiledSelectors::compile(&config.site)?);
    let fetcher = RetryFetch::new(
        HttpFetcher::new(config.fetch.timeout(), config.fetch.connect_timeout())?,
        config.fetch.max_retries,
        config.fetch.retry_base_delay(),
    );
    let options = IngestOptions {
        max_concurrency: config.fetch.max_concurrency,
        fetch_timeout: fetcher.time_budget(config.fetch.timeout()),
        sink_timeout: config.sink.timeout(),
        dedup: config.dedup,
    };
    Ok(Ingestor::new(Arc::new(fetcher), sink, selectors, options))
}

/// Run both triggers until Ctrl-C, then let in-flight runs finish.
async fn run_schedules(
    config: &AppConfig,
    ingestor: Arc<Ingestor>,
    sweeper: Arc<Sweeper>,
) -> Result<(), Box<dyn Error>> {
    let cancel = CancellationToken::new();
    let ingest = scheduler::spawn(config.ingest_schedule()?, IngestJob(ingestor), cancel.clone());
    let retention = scheduler::spawn(config.retention_schedule()?, SweepJob(sweeper), cancel.clone());
    info!(
        ingest = %config.schedule.ingest,
        retention = %config.schedule.retention,
        "Schedules started; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested; waiting for in-flight runs");
    cancel.cancel();

    let (ingest, retention) = tokio::join!(ingest, retention);
    for joined in [ingest, retention] {
        if let Err(e) = joined {
            error!(error = %e, "Trigger task ended abnormally");
        }
    }
    info!("Stopped");
    Ok(())
}

async fn show(sink: &dyn Sink, window: WindowArg) -> Result<(), Box<dyn Error>> {
    let now = Local::now();
    let window = window.window(now);
    let records = sink.query(window.start, window.end.unwrap_or(now)).await?;
    if records.is_empty() {
        println!("No news available");
        return Ok(());
    }
    println!(
        "News for {} ({} edition)",
        now.date_naive(),
        Edition::containing(now)
    );
    for record in records {
        println!(
            "[{}] {}\n    {}",
            record.publication_time.format("%H:%M"),
            record.headline,
            record.description
        );
    }
    Ok(())
}
