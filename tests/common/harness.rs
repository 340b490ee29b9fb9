//! Pipeline construction for tests.

use super::constants::{FIRST_WEEK, TEST_BASE_URL, TEST_CHART};
use super::transport::StubTransport;
use anyhow::{bail, Result};
use hot100_etl::chart::{ChartDate, ChartEntry, DateRange, WeekdayRounding};
use hot100_etl::chart_store::BatchLoader;
use hot100_etl::fetcher::{chart_url, RequestPacer, RetryPolicy, RetryingHttpClient};
use hot100_etl::parser::ChartPageParser;
use hot100_etl::pipeline::{ExtractionContext, ExtractionPipeline, PipelineSettings};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The `n`th test week, counting from [`FIRST_WEEK`].
pub fn week(n: usize) -> ChartDate {
    let mut date = ChartDate::parse_iso(FIRST_WEEK).unwrap();
    for _ in 0..n {
        date = date.next_week();
    }
    date
}

/// Range covering weeks `0..count`.
pub fn weeks(count: usize) -> DateRange {
    DateRange::new(
        week(0).date(),
        week(count - 1).date(),
        WeekdayRounding::Backward,
    )
    .unwrap()
}

pub fn url_for(date: ChartDate) -> String {
    chart_url(TEST_BASE_URL, TEST_CHART, date)
}

pub fn fast_retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_base_ms: 1,
        max_backoff_ms: 5,
        ..Default::default()
    }
}

pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        scrape_workers: 3,
        normalize_workers: 2,
        task_queue_capacity: 4,
        chart_queue_capacity: 4,
        batch_size: 2,
        progress_interval: Duration::from_millis(20),
        malformed_escalation_ratio: 0.25,
    }
}

pub struct PipelineBuilder {
    transport: Arc<StubTransport>,
    loader: Option<Arc<dyn BatchLoader>>,
    settings: PipelineSettings,
    max_attempts: u32,
    max_in_flight: usize,
}

impl PipelineBuilder {
    pub fn new(transport: Arc<StubTransport>) -> Self {
        Self {
            transport,
            loader: None,
            settings: test_settings(),
            max_attempts: 3,
            max_in_flight: 15,
        }
    }

    pub fn loader(mut self, loader: Arc<dyn BatchLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn build(self) -> ExtractionPipeline {
        let client = RetryingHttpClient::new(
            self.transport,
            fast_retry_policy(self.max_attempts),
            self.max_in_flight,
        );
        let context = ExtractionContext {
            client,
            parser: ChartPageParser::new(),
            pacer: RequestPacer::disabled(),
            base_url: TEST_BASE_URL.to_string(),
            chart_name: TEST_CHART.to_string(),
            loader: self.loader,
        };
        ExtractionPipeline::new(context, self.settings)
    }
}

/// Loader that accepts the first `succeed_first` batches and fails after.
/// Accepted batches are passed on to `inner` when one is set.
pub struct FailingLoader {
    succeed_first: usize,
    calls: AtomicUsize,
    inner: Option<Arc<dyn BatchLoader>>,
}

impl FailingLoader {
    pub fn new(succeed_first: usize) -> Self {
        Self {
            succeed_first,
            calls: AtomicUsize::new(0),
            inner: None,
        }
    }

    pub fn wrapping(inner: Arc<dyn BatchLoader>, succeed_first: usize) -> Self {
        Self {
            inner: Some(inner),
            ..Self::new(succeed_first)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BatchLoader for FailingLoader {
    fn load_batch(&self, entries: &[ChartEntry]) -> Result<usize> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.succeed_first {
            bail!("schema mismatch: column song missing");
        }
        match &self.inner {
            Some(inner) => inner.load_batch(entries),
            None => Ok(entries.len()),
        }
    }
}
