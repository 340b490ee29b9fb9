use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional TOML configuration. Every field overrides its CLI counterpart.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub base_url: Option<String>,
    pub chart_name: Option<String>,
    /// `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`
    pub end_date: Option<String>,
    pub resume: Option<bool>,
    pub request_delay_mean_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub batch_size: Option<usize>,
    pub progress_interval_secs: Option<u64>,
    pub malformed_escalation_ratio: Option<f64>,

    pub concurrency: Option<ConcurrencyConfig>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub scrape_workers: Option<usize>,
    pub normalize_workers: Option<usize>,
    pub max_in_flight_requests: Option<usize>,
    pub task_queue_capacity: Option<usize>,
    pub chart_queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub retryable_statuses: Option<Vec<u16>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_full_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
db_path = "/data/charts.db"
chart_name = "billboard-200"
start_date = "2000-01-01"
resume = true
request_delay_mean_ms = 0

[concurrency]
scrape_workers = 8
max_in_flight_requests = 4

[retry]
max_attempts = 5
retryable_statuses = [503]
"#,
        )
        .unwrap();

        let config = FileConfig::load(&path).unwrap();

        assert_eq!(config.db_path.as_deref(), Some("/data/charts.db"));
        assert_eq!(config.chart_name.as_deref(), Some("billboard-200"));
        assert_eq!(config.start_date.as_deref(), Some("2000-01-01"));
        assert_eq!(config.resume, Some(true));
        assert_eq!(config.request_delay_mean_ms, Some(0));
        let concurrency = config.concurrency.unwrap();
        assert_eq!(concurrency.scrape_workers, Some(8));
        assert_eq!(concurrency.normalize_workers, None);
        let retry = config.retry.unwrap();
        assert_eq!(retry.max_attempts, Some(5));
        assert_eq!(retry.retryable_statuses, Some(vec![503]));
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert!(config.db_path.is_none());
        assert!(config.concurrency.is_none());
    }

    #[test]
    fn test_invalid_toml_is_reported_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "scrape_workers = [").unwrap();

        let err = FileConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_file() {
        let err = FileConfig::load(Path::new("/nonexistent/hot100.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
