//! Configuration loading and validation.
//!
//! Configuration comes from a YAML file, optionally patched by CLI flags or
//! environment variables (see [`crate::cli::Cli`]). Validation happens once,
//! at load, so a bad selector or cron expression stops the process before any
//! trigger is scheduled.
//!
//! # Example
//!
//! ```yaml
//! site:
//!   listing_url: https://news.example/latest
//!   base_url: https://news.example
//!   item_selector: ".news-feed .item"
//!   headline_selector: "h1.title"
//!   description_selector: ".article-body p"
//!   publication_time_selector: "time.published"
//! sink:
//!   url: http://localhost:8080/news
//! schedule:
//!   ingest: "0 */15 * * * *"
//!   retention: "0 0 3 * * *"
//! ```

use crate::error::ConfigError;
use cron::Schedule;
use scraper::Selector;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub site: SelectorConfig,
    pub sink: SinkConfig,
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Skip records this process already delivered.
    #[serde(default = "default_true")]
    pub dedup: bool,
}

/// Where to find the listing page and which selectors address each field.
///
/// Selector strings are opaque here; they are only compiled by
/// [`CompiledSelectors::compile`].
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Absolute URL of the page enumerating news items.
    pub listing_url: String,
    /// Base for resolving relative item links; defaults to `listing_url`.
    #[serde(default)]
    pub base_url: Option<String>,
    pub item_selector: String,
    pub headline_selector: String,
    pub description_selector: String,
    pub publication_time_selector: String,
    /// Attribute on the timestamp node holding the machine-readable time.
    #[serde(default = "default_time_attribute")]
    pub publication_time_attribute: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Collection endpoint of the news store, e.g. `http://localhost:8080/news`.
    pub url: String,
    #[serde(default = "default_sink_timeout_secs")]
    pub timeout_secs: u64,
}

/// Six-field cron expressions (`sec min hour dom month dow`).
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub ingest: String,
    pub retention: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Detail pages fetched at once.
    pub max_concurrency: usize,
    /// Extra attempts for transient failures.
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            connect_timeout_secs: 5,
            max_concurrency: 4,
            max_retries: 2,
            retry_base_delay_ms: 500,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_time_attribute() -> String {
    "datetime".to_string()
}

fn default_sink_timeout_secs() -> u64 {
    10
}

/// Values that take precedence over the file when set.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub listing_url: Option<String>,
    pub sink_url: Option<String>,
    pub ingest_cron: Option<String>,
    pub retention_cron: Option<String>,
}

impl AppConfig {
    /// Read, patch and validate the configuration file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text, overrides)?;
        info!(listing_url = %config.site.listing_url, sink = %config.sink.url, "Loaded configuration");
        Ok(config)
    }

    /// Parse, patch and validate configuration text.
    pub fn from_yaml(text: &str, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config: AppConfig = serde_yaml::from_str(text)?;
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.listing_url {
            self.site.listing_url = url.clone();
        }
        if let Some(url) = &overrides.sink_url {
            self.sink.url = url.clone();
        }
        if let Some(expr) = &overrides.ingest_cron {
            self.schedule.ingest = expr.clone();
        }
        if let Some(expr) = &overrides.retention_cron {
            self.schedule.retention = expr.clone();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        CompiledSelectors::compile(&self.site)?;
        parse_url("sink.url", &self.sink.url)?;
        parse_cron("schedule.ingest", &self.schedule.ingest)?;
        parse_cron("schedule.retention", &self.schedule.retention)?;
        if self.fetch.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "fetch.max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ingest_schedule(&self) -> Result<Schedule, ConfigError> {
        parse_cron("schedule.ingest", &self.schedule.ingest)
    }

    pub fn retention_schedule(&self) -> Result<Schedule, ConfigError> {
        parse_cron("schedule.retention", &self.schedule.retention)
    }
}

/// [`SelectorConfig`] resolved once into parsed URLs and compiled selectors.
///
/// Read-only after construction and shared across concurrent item fetches.
#[derive(Debug)]
pub struct CompiledSelectors {
    pub listing_url: Url,
    pub base_url: Url,
    pub item: Selector,
    pub headline: Selector,
    pub description: Selector,
    pub publication_time: Selector,
    pub publication_time_attribute: String,
}

impl CompiledSelectors {
    pub fn compile(config: &SelectorConfig) -> Result<Self, ConfigError> {
        let listing_url = parse_url("site.listing_url", &config.listing_url)?;
        let base_url = match &config.base_url {
            Some(base) => parse_url("site.base_url", base)?,
            None => listing_url.clone(),
        };
        Ok(Self {
            listing_url,
            base_url,
            item: compile_selector("site.item_selector", &config.item_selector)?,
            headline: compile_selector("site.headline_selector", &config.headline_selector)?,
            description: compile_selector(
                "site.description_selector",
                &config.description_selector,
            )?,
            publication_time: compile_selector(
                "site.publication_time_selector",
                &config.publication_time_selector,
            )?,
            publication_time_attribute: config.publication_time_attribute.clone(),
        })
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::Url {
        field,
        value: value.to_string(),
        source,
    })
}

fn compile_selector(field: &'static str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        field,
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

pub fn parse_cron(field: &'static str, expr: &str) -> Result<Schedule, ConfigError> {
    Schedule::from_str(expr).map_err(|e| ConfigError::Cron {
        field,
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
site:
  listing_url: https://news.example/latest
  base_url: https://news.example
  item_selector: ".feed .item"
  headline_selector: "h1.title"
  description_selector: ".body p"
  publication_time_selector: "time.published"
sink:
  url: http://localhost:8080/news
schedule:
  ingest: "0 */15 * * * *"
  retention: "0 0 3 * * *"
"#;

    #[test]
    fn test_sample_config_loads_with_defaults() {
        let config = AppConfig::from_yaml(SAMPLE, &Overrides::default()).unwrap();
        assert_eq!(config.site.listing_url, "https://news.example/latest");
        assert_eq!(config.site.publication_time_attribute, "datetime");
        assert_eq!(config.sink.timeout_secs, 10);
        assert_eq!(config.fetch.max_concurrency, 4);
        assert!(config.dedup);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = Overrides {
            sink_url: Some("http://store:9000/news".to_string()),
            ingest_cron: Some("0 0 * * * *".to_string()),
            ..Default::default()
        };
        let config = AppConfig::from_yaml(SAMPLE, &overrides).unwrap();
        assert_eq!(config.sink.url, "http://store:9000/news");
        assert_eq!(config.schedule.ingest, "0 0 * * * *");
        assert_eq!(config.schedule.retention, "0 0 3 * * *");
    }

    #[test]
    fn test_invalid_cron_is_rejected() {
        let overrides = Overrides {
            retention_cron: Some("every night".to_string()),
            ..Default::default()
        };
        let err = AppConfig::from_yaml(SAMPLE, &overrides).unwrap_err();
        assert!(matches!(err, ConfigError::Cron { field: "schedule.retention", .. }));
    }

    #[test]
    fn test_uncompilable_selector_is_rejected() {
        let text = SAMPLE.replace("h1.title", "h1[");
        let err = AppConfig::from_yaml(&text, &Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Selector { field: "site.headline_selector", .. }));
    }

    #[test]
    fn test_base_url_defaults_to_listing_url() {
        let text = SAMPLE.replace("  base_url: https://news.example\n", "");
        let config = AppConfig::from_yaml(&text, &Overrides::default()).unwrap();
        let compiled = CompiledSelectors::compile(&config.site).unwrap();
        assert_eq!(compiled.base_url.as_str(), "https://news.example/latest");
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let text = format!("{SAMPLE}fetch:\n  max_concurrency: 0\n");
        assert!(matches!(
            AppConfig::from_yaml(&text, &Overrides::default()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
