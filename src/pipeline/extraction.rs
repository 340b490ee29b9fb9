//! Producer, scrape workers and normalize workers for one extraction run.
//!
//! ```text
//! dates -> [task queue] -> scrape workers -> [chart queue] -> normalize workers -> BatchLoader
//! ```
//!
//! Both queues are bounded so a fast stage waits on a slow one. The producer
//! ends the task queue with one `Done` per scrape worker; the last scrape
//! worker to finish ends the chart queue with one `Done` per normalize
//! worker. Per-date failures are recorded and skipped. Counter overflow and
//! loader failures cancel every task of the run.

use super::counter::{CounterError, ProgressCounter};
use super::progress::ProgressReporter;
use super::report::{detect_page_shape_change, RunReport, SkipReason, SkippedChart};
use crate::artists::normalize_artist_credit;
use crate::chart::{ChartDate, ChartEntry, DateRange, ParsedChart};
use crate::chart_store::BatchLoader;
use crate::fetcher::{chart_url, RequestPacer, RetryingHttpClient};
use crate::parser::ChartPageParser;
use futures::future::join_all;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Persistence failed after {persisted_charts} charts were stored: {source}")]
    Persistence {
        persisted_charts: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("{source} ({persisted_charts} charts were stored)")]
    Counter {
        persisted_charts: usize,
        #[source]
        source: CounterError,
    },
    #[error("Extraction cancelled after {persisted_charts} charts were stored")]
    Cancelled { persisted_charts: usize },
    #[error("Worker task failed after {persisted_charts} charts were stored: {message}")]
    Worker {
        persisted_charts: usize,
        message: String,
    },
}

impl PipelineError {
    /// Charts acknowledged by the loader before the run ended.
    pub fn persisted_charts(&self) -> usize {
        match self {
            PipelineError::Persistence {
                persisted_charts, ..
            }
            | PipelineError::Counter {
                persisted_charts, ..
            }
            | PipelineError::Cancelled { persisted_charts }
            | PipelineError::Worker {
                persisted_charts, ..
            } => *persisted_charts,
        }
    }

    /// Same error, reporting `durable` stored charts.
    fn with_persisted_charts(self, durable: usize) -> Self {
        match self {
            PipelineError::Persistence { source, .. } => PipelineError::Persistence {
                persisted_charts: durable,
                source,
            },
            PipelineError::Counter { source, .. } => PipelineError::Counter {
                persisted_charts: durable,
                source,
            },
            PipelineError::Cancelled { .. } => PipelineError::Cancelled {
                persisted_charts: durable,
            },
            PipelineError::Worker { message, .. } => PipelineError::Worker {
                persisted_charts: durable,
                message,
            },
        }
    }

    fn worker(err: impl std::fmt::Display) -> Self {
        PipelineError::Worker {
            persisted_charts: 0,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Producing,
    Draining,
    Done,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Producing,
            2 => PipelineState::Draining,
            3 => PipelineState::Done,
            _ => PipelineState::Idle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub scrape_workers: usize,
    pub normalize_workers: usize,
    pub task_queue_capacity: usize,
    pub chart_queue_capacity: usize,
    /// Charts per loader call.
    pub batch_size: usize,
    pub progress_interval: Duration,
    pub malformed_escalation_ratio: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            scrape_workers: 5,
            normalize_workers: 5,
            task_queue_capacity: 15,
            chart_queue_capacity: 100,
            batch_size: 100,
            progress_interval: Duration::from_secs(10),
            malformed_escalation_ratio: 0.25,
        }
    }
}

/// Everything the workers of a run share.
pub struct ExtractionContext {
    pub client: RetryingHttpClient,
    pub parser: ChartPageParser,
    pub pacer: RequestPacer,
    pub base_url: String,
    pub chart_name: String,
    /// When absent, normalized entries are returned in the outcome instead.
    pub loader: Option<Arc<dyn BatchLoader>>,
}

#[derive(Debug)]
pub struct ExtractionOutcome {
    pub report: RunReport,
    /// Entries not handed to a loader, sorted by (date, position).
    pub entries: Vec<ChartEntry>,
}

enum WorkItem<T> {
    Item(T),
    Done,
}

struct ChartTask {
    date: ChartDate,
    url: String,
}

#[derive(Default)]
struct NormalizeSummary {
    persisted_entries: usize,
    retained: Vec<ChartEntry>,
}

type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<WorkItem<T>>>>;

pub struct ExtractionPipeline {
    context: Arc<ExtractionContext>,
    settings: PipelineSettings,
    state: Arc<AtomicU8>,
    dates_queued: Arc<AtomicUsize>,
}

impl ExtractionPipeline {
    pub fn new(context: ExtractionContext, settings: PipelineSettings) -> Self {
        Self {
            context: Arc::new(context),
            settings,
            state: Arc::new(AtomicU8::new(PipelineState::Idle as u8)),
            dates_queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Dates the producer has handed to the task queue in the current run.
    pub fn dates_queued(&self) -> usize {
        self.dates_queued.load(Ordering::SeqCst)
    }

    pub async fn run(&self, range: DateRange) -> Result<ExtractionOutcome, PipelineError> {
        self.run_until_cancelled(range, CancellationToken::new())
            .await
    }

    /// Run the extraction; `shutdown` aborts it from outside.
    pub async fn run_until_cancelled(
        &self,
        range: DateRange,
        shutdown: CancellationToken,
    ) -> Result<ExtractionOutcome, PipelineError> {
        let started = Instant::now();
        let requested = range.chart_count();
        let scrape_workers = self.settings.scrape_workers.max(1);
        let normalize_workers = self.settings.normalize_workers.max(1);

        info!(
            "Extracting {} charts ({} to {}) with {} scrape and {} normalize workers",
            requested,
            range.start(),
            range.end(),
            scrape_workers,
            normalize_workers
        );

        let cancel = shutdown.child_token();
        let counter = Arc::new(ProgressCounter::new(requested as u64));
        let persisted_charts = Arc::new(AtomicUsize::new(0));
        let scrapers_left = Arc::new(AtomicUsize::new(scrape_workers));

        let (task_tx, task_rx) = mpsc::channel(self.settings.task_queue_capacity.max(1));
        let (chart_tx, chart_rx) = mpsc::channel(self.settings.chart_queue_capacity.max(1));
        let task_rx: SharedReceiver<ChartTask> = Arc::new(Mutex::new(task_rx));
        let chart_rx: SharedReceiver<ParsedChart> = Arc::new(Mutex::new(chart_rx));

        let reporter_stop = cancel.child_token();
        let reporter = tokio::spawn(
            ProgressReporter::new(counter.clone(), self.settings.progress_interval)
                .run(reporter_stop.clone()),
        );

        self.dates_queued.store(0, Ordering::SeqCst);
        self.set_state(PipelineState::Producing);
        let producer = tokio::spawn(produce(
            self.context.clone(),
            range,
            task_tx,
            scrape_workers,
            self.state.clone(),
            self.dates_queued.clone(),
            cancel.clone(),
        ));

        let scrapers: Vec<JoinHandle<Result<Vec<SkippedChart>, PipelineError>>> = (0
            ..scrape_workers)
            .map(|worker_id| {
                tokio::spawn(scrape_worker(
                    worker_id,
                    self.context.clone(),
                    task_rx.clone(),
                    chart_tx.clone(),
                    counter.clone(),
                    scrapers_left.clone(),
                    normalize_workers,
                    cancel.clone(),
                ))
            })
            .collect();
        drop(chart_tx);

        let normalizers: Vec<JoinHandle<Result<NormalizeSummary, PipelineError>>> = (0
            ..normalize_workers)
            .map(|worker_id| {
                tokio::spawn(normalize_worker(
                    worker_id,
                    self.context.clone(),
                    chart_rx.clone(),
                    persisted_charts.clone(),
                    self.settings.batch_size.max(1),
                    cancel.clone(),
                ))
            })
            .collect();

        let mut fatal: Option<PipelineError> = None;
        let mut skipped = Vec::new();
        let mut entries = Vec::new();
        let mut persisted_entries = 0;

        if let Err(e) = producer.await {
            record_fatal(&mut fatal, PipelineError::worker(e), &cancel);
        }
        for joined in join_all(scrapers).await {
            match flatten(joined) {
                Ok(worker_skipped) => skipped.extend(worker_skipped),
                Err(e) => record_fatal(&mut fatal, e, &cancel),
            }
        }
        for joined in join_all(normalizers).await {
            match flatten(joined) {
                Ok(summary) => {
                    persisted_entries += summary.persisted_entries;
                    entries.extend(summary.retained);
                }
                Err(e) => record_fatal(&mut fatal, e, &cancel),
            }
        }

        reporter_stop.cancel();
        if let Err(e) = reporter.await {
            warn!("Progress reporter ended abnormally: {}", e);
        }
        self.set_state(PipelineState::Done);

        let durable = persisted_charts.load(Ordering::SeqCst);
        if let Some(err) = fatal {
            let err = err.with_persisted_charts(durable);
            error!("Extraction aborted: {}", err);
            return Err(err);
        }
        if shutdown.is_cancelled() {
            return Err(PipelineError::Cancelled {
                persisted_charts: durable,
            });
        }

        skipped.sort_by_key(|s: &SkippedChart| s.date);
        entries.sort_by_key(|e: &ChartEntry| (e.date, e.position));

        let page_shape_warning = detect_page_shape_change(
            &skipped,
            requested,
            self.settings.malformed_escalation_ratio,
        );

        let report = RunReport {
            start: range.start(),
            end: range.end(),
            requested,
            succeeded: counter.value().await as usize,
            skipped,
            persisted_charts: durable,
            persisted_entries,
            elapsed: started.elapsed(),
            page_shape_warning,
        };

        Ok(ExtractionOutcome { report, entries })
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

fn flatten<T>(
    joined: Result<Result<T, PipelineError>, tokio::task::JoinError>,
) -> Result<T, PipelineError> {
    joined.map_err(PipelineError::worker)?
}

/// Keep the first fatal error; later ones are usually fallout of the cancel.
fn record_fatal(slot: &mut Option<PipelineError>, err: PipelineError, cancel: &CancellationToken) {
    cancel.cancel();
    if slot.is_none() {
        *slot = Some(err);
    } else {
        debug!("Additional failure after abort: {}", err);
    }
}

async fn send_or_cancel<T>(
    tx: &mpsc::Sender<WorkItem<T>>,
    item: WorkItem<T>,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        sent = tx.send(item) => sent.is_ok(),
        _ = cancel.cancelled() => false,
    }
}

async fn recv_or_cancel<T>(
    rx: &SharedReceiver<T>,
    cancel: &CancellationToken,
) -> Option<WorkItem<T>> {
    tokio::select! {
        item = async { rx.lock().await.recv().await } => item,
        _ = cancel.cancelled() => None,
    }
}

async fn produce(
    context: Arc<ExtractionContext>,
    range: DateRange,
    tx: mpsc::Sender<WorkItem<ChartTask>>,
    scrape_workers: usize,
    state: Arc<AtomicU8>,
    queued: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    for date in range.dates() {
        let task = ChartTask {
            date,
            url: chart_url(&context.base_url, &context.chart_name, date),
        };
        if !send_or_cancel(&tx, WorkItem::Item(task), &cancel).await {
            return;
        }
        queued.fetch_add(1, Ordering::SeqCst);
    }
    for _ in 0..scrape_workers {
        if !send_or_cancel(&tx, WorkItem::Done, &cancel).await {
            return;
        }
    }
    state.store(PipelineState::Draining as u8, Ordering::SeqCst);
    debug!("All {} dates queued", range.chart_count());
}

#[allow(clippy::too_many_arguments)]
async fn scrape_worker(
    worker_id: usize,
    context: Arc<ExtractionContext>,
    tasks: SharedReceiver<ChartTask>,
    charts: mpsc::Sender<WorkItem<ParsedChart>>,
    counter: Arc<ProgressCounter>,
    scrapers_left: Arc<AtomicUsize>,
    normalize_workers: usize,
    cancel: CancellationToken,
) -> Result<Vec<SkippedChart>, PipelineError> {
    let mut skipped = Vec::new();

    while let Some(WorkItem::Item(task)) = recv_or_cancel(&tasks, &cancel).await {
        match scrape(&context, &task).await {
            Ok(chart) => {
                counter.increment().await.map_err(|source| {
                    cancel.cancel();
                    PipelineError::Counter {
                        persisted_charts: 0,
                        source,
                    }
                })?;
                if !send_or_cancel(&charts, WorkItem::Item(chart), &cancel).await {
                    break;
                }
            }
            Err(reason) => {
                warn!("Skipping chart {}: {}", task.date, reason);
                skipped.push(SkippedChart {
                    date: task.date,
                    reason,
                });
            }
        }

        tokio::select! {
            _ = context.pacer.pause() => {}
            _ = cancel.cancelled() => break,
        }
    }

    if scrapers_left.fetch_sub(1, Ordering::SeqCst) == 1 && !cancel.is_cancelled() {
        for _ in 0..normalize_workers {
            if !send_or_cancel(&charts, WorkItem::Done, &cancel).await {
                break;
            }
        }
    }
    debug!("Scrape worker {} finished", worker_id);
    Ok(skipped)
}

async fn scrape(context: &ExtractionContext, task: &ChartTask) -> Result<ParsedChart, SkipReason> {
    let body = context
        .client
        .fetch(&task.url)
        .await
        .map_err(|e| SkipReason::from(&e))?;
    context
        .parser
        .parse(&body, task.date)
        .map_err(|e| SkipReason::from(&e))
}

async fn normalize_worker(
    worker_id: usize,
    context: Arc<ExtractionContext>,
    charts: SharedReceiver<ParsedChart>,
    persisted_charts: Arc<AtomicUsize>,
    batch_size: usize,
    cancel: CancellationToken,
) -> Result<NormalizeSummary, PipelineError> {
    let mut summary = NormalizeSummary::default();
    let mut batch: Vec<ChartEntry> = Vec::new();
    let mut batch_charts = 0;

    loop {
        match recv_or_cancel(&charts, &cancel).await {
            Some(WorkItem::Item(chart)) => {
                let date = chart.date;
                batch.extend(chart.entries.into_iter().map(|raw| {
                    let artists = normalize_artist_credit(&raw.artist_credit);
                    ChartEntry::new(date, raw, artists)
                }));
                batch_charts += 1;
                if batch_charts >= batch_size {
                    flush(&context, &mut batch, batch_charts, &persisted_charts, &mut summary, &cancel)
                        .await?;
                    batch_charts = 0;
                }
            }
            Some(WorkItem::Done) | None => break,
        }
    }

    if cancel.is_cancelled() {
        debug!("Normalize worker {} cancelled with {} unflushed charts", worker_id, batch_charts);
        return Ok(summary);
    }
    if batch_charts > 0 {
        flush(&context, &mut batch, batch_charts, &persisted_charts, &mut summary, &cancel).await?;
    }
    debug!("Normalize worker {} finished", worker_id);
    Ok(summary)
}

async fn flush(
    context: &ExtractionContext,
    batch: &mut Vec<ChartEntry>,
    batch_charts: usize,
    persisted_charts: &AtomicUsize,
    summary: &mut NormalizeSummary,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let entries = std::mem::take(batch);
    let Some(loader) = context.loader.clone() else {
        summary.retained.extend(entries);
        return Ok(());
    };

    let loaded = tokio::task::spawn_blocking(move || loader.load_batch(&entries))
        .await
        .map_err(|e| {
            cancel.cancel();
            PipelineError::worker(e)
        })?;

    match loaded {
        Ok(rows) => {
            persisted_charts.fetch_add(batch_charts, Ordering::SeqCst);
            summary.persisted_entries += rows;
            debug!("Persisted {} charts ({} rows)", batch_charts, rows);
            Ok(())
        }
        Err(source) => {
            cancel.cancel();
            Err(PipelineError::Persistence {
                persisted_charts: persisted_charts.load(Ordering::SeqCst),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_report_durable_charts() {
        let counter = PipelineError::Counter {
            persisted_charts: 0,
            source: CounterError::Overflow {
                attempted: 4,
                stop_at: 3,
            },
        }
        .with_persisted_charts(2);
        assert_eq!(counter.persisted_charts(), 2);
        assert!(matches!(counter, PipelineError::Counter { .. }));

        let worker = PipelineError::worker("task panicked").with_persisted_charts(5);
        assert_eq!(worker.persisted_charts(), 5);
        assert!(worker.to_string().contains("task panicked"));
    }
}
