mod file_config;

pub use file_config::{ConcurrencyConfig, FileConfig, RetryConfig};

use crate::chart::{ChartDate, DateRange, WeekdayRounding, OLDEST_CHART_DATE};
use crate::fetcher::TransportConfig;
use crate::pipeline::PipelineSettings;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.billboard.com/charts";
pub const DEFAULT_CHART_NAME: &str = "hot-100";

/// CLI arguments that can be overridden by the TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub base_url: String,
    pub chart_name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub resume: bool,
    pub scrape_workers: usize,
    pub normalize_workers: usize,
    pub max_in_flight_requests: usize,
    pub max_attempts: u32,
    pub request_delay_mean_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        let concurrency = ConcurrencySettings::default();
        Self {
            db_path: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            chart_name: DEFAULT_CHART_NAME.to_string(),
            start_date: None,
            end_date: None,
            resume: false,
            scrape_workers: concurrency.scrape_workers,
            normalize_workers: concurrency.normalize_workers,
            max_in_flight_requests: concurrency.max_in_flight_requests,
            max_attempts: RetrySettings::default().max_attempts,
            request_delay_mean_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub base_url: String,
    pub chart_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub resume: bool,
    pub request_delay_mean_ms: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub batch_size: usize,
    pub progress_interval_secs: u64,
    pub malformed_escalation_ratio: f64,

    pub concurrency: ConcurrencySettings,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencySettings {
    pub scrape_workers: usize,
    pub normalize_workers: usize,
    pub max_in_flight_requests: usize,
    pub task_queue_capacity: usize,
    pub chart_queue_capacity: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            scrape_workers: 5,
            normalize_workers: 5,
            max_in_flight_requests: 15,
            task_queue_capacity: 15,
            chart_queue_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_backoff_ms: u64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 250,
            max_backoff_ms: 15_000,
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present. `today` anchors the
    /// default end date.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>, today: NaiveDate) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let base_url = file.base_url.unwrap_or_else(|| cli.base_url.clone());
        let chart_name = file.chart_name.unwrap_or_else(|| cli.chart_name.clone());
        if chart_name.trim_matches('/').is_empty() {
            bail!("chart_name must not be empty");
        }

        let start_date = parse_date_override(file.start_date.as_deref(), "start_date")?
            .or(cli.start_date)
            .unwrap_or(OLDEST_CHART_DATE);
        let end_date = parse_date_override(file.end_date.as_deref(), "end_date")?
            .or(cli.end_date)
            .unwrap_or_else(|| ChartDate::most_recent(today).date());
        if start_date < OLDEST_CHART_DATE {
            bail!(
                "start_date {} precedes the first published chart ({})",
                start_date,
                OLDEST_CHART_DATE
            );
        }

        let cc_file = file.concurrency.unwrap_or_default();
        let cc_defaults = ConcurrencySettings::default();
        let concurrency = ConcurrencySettings {
            scrape_workers: cc_file.scrape_workers.unwrap_or(cli.scrape_workers),
            normalize_workers: cc_file.normalize_workers.unwrap_or(cli.normalize_workers),
            max_in_flight_requests: cc_file
                .max_in_flight_requests
                .unwrap_or(cli.max_in_flight_requests),
            task_queue_capacity: cc_file
                .task_queue_capacity
                .unwrap_or(cc_defaults.task_queue_capacity),
            chart_queue_capacity: cc_file
                .chart_queue_capacity
                .unwrap_or(cc_defaults.chart_queue_capacity),
        };
        for (name, value) in [
            ("scrape_workers", concurrency.scrape_workers),
            ("normalize_workers", concurrency.normalize_workers),
            ("max_in_flight_requests", concurrency.max_in_flight_requests),
            ("task_queue_capacity", concurrency.task_queue_capacity),
            ("chart_queue_capacity", concurrency.chart_queue_capacity),
        ] {
            if value == 0 {
                bail!("{} must be at least 1", name);
            }
        }

        let retry_file = file.retry.unwrap_or_default();
        let retry_defaults = RetrySettings::default();
        let retry = RetrySettings {
            max_attempts: retry_file.max_attempts.unwrap_or(cli.max_attempts),
            backoff_base_ms: retry_file
                .backoff_base_ms
                .unwrap_or(retry_defaults.backoff_base_ms),
            max_backoff_ms: retry_file
                .max_backoff_ms
                .unwrap_or(retry_defaults.max_backoff_ms),
            retryable_statuses: retry_file
                .retryable_statuses
                .unwrap_or(retry_defaults.retryable_statuses),
        };
        if retry.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }

        let batch_size = file.batch_size.unwrap_or(100);
        if batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        let malformed_escalation_ratio = file.malformed_escalation_ratio.unwrap_or(0.25);
        if !(malformed_escalation_ratio > 0.0 && malformed_escalation_ratio <= 1.0) {
            bail!(
                "malformed_escalation_ratio must be in (0, 1], got {}",
                malformed_escalation_ratio
            );
        }

        let config = Self {
            db_path,
            base_url,
            chart_name,
            start_date,
            end_date,
            resume: file.resume.unwrap_or(cli.resume),
            request_delay_mean_ms: file
                .request_delay_mean_ms
                .unwrap_or(cli.request_delay_mean_ms),
            request_timeout_secs: file.request_timeout_secs.unwrap_or(10),
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(5),
            batch_size,
            progress_interval_secs: file.progress_interval_secs.unwrap_or(10),
            malformed_escalation_ratio,
            concurrency,
            retry,
        };

        // Reject reversed ranges before any I/O.
        config.date_range()?;
        Ok(config)
    }

    pub fn date_range(&self) -> Result<DateRange> {
        self.date_range_from(self.start_date)
    }

    /// Same range with a different start, as used when resuming.
    pub fn date_range_from(&self, start: NaiveDate) -> Result<DateRange> {
        DateRange::new(start, self.end_date, WeekdayRounding::Backward)
            .context("Invalid extraction date range")
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            scrape_workers: self.concurrency.scrape_workers,
            normalize_workers: self.concurrency.normalize_workers,
            task_queue_capacity: self.concurrency.task_queue_capacity,
            chart_queue_capacity: self.concurrency.chart_queue_capacity,
            batch_size: self.batch_size,
            progress_interval: Duration::from_secs(self.progress_interval_secs.max(1)),
            malformed_escalation_ratio: self.malformed_escalation_ratio,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..Default::default()
        }
    }

    pub fn request_delay_mean(&self) -> Duration {
        Duration::from_millis(self.request_delay_mean_ms)
    }
}

fn parse_date_override(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("Invalid {} {:?}, expected YYYY-MM-DD", field, s))
        })
        .transpose()
}
