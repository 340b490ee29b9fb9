use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hot100_etl::chart_store::{next_missing_date, BatchLoader, ChartStore, ExtractionRun, SqliteChartStore};
use hot100_etl::config::{AppConfig, CliConfig, FileConfig, DEFAULT_BASE_URL, DEFAULT_CHART_NAME};
use hot100_etl::fetcher::{ReqwestTransport, RequestPacer, RetryPolicy, RetryingHttpClient};
use hot100_etl::parser::ChartPageParser;
use hot100_etl::pipeline::{ExtractionContext, ExtractionPipeline};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path = PathBuf::from(s);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Error resolving current directory")?;
    Ok(cwd.join(path))
}

#[derive(Parser, Debug)]
#[clap(version, about = "Extract weekly chart history into SQLite")]
struct CliArgs {
    /// Path to the SQLite chart database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Root of the chart site.
    #[clap(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Chart to extract.
    #[clap(long, default_value = DEFAULT_CHART_NAME)]
    pub chart_name: String,

    /// First date to extract (YYYY-MM-DD). Defaults to the first published chart.
    #[clap(long)]
    pub start_date: Option<NaiveDate>,

    /// Last date to extract (YYYY-MM-DD). Defaults to the most recent Saturday.
    #[clap(long)]
    pub end_date: Option<NaiveDate>,

    /// Start from the first week of the range missing from the database.
    #[clap(long)]
    pub resume: bool,

    #[clap(long, default_value_t = 5)]
    pub scrape_workers: usize,

    #[clap(long, default_value_t = 5)]
    pub normalize_workers: usize,

    /// Upper bound on concurrent HTTP requests.
    #[clap(long, default_value_t = 15)]
    pub max_in_flight_requests: usize,

    /// Attempts per page, including the first.
    #[clap(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Mean of the random pause after each page fetch. 0 disables it.
    #[clap(long, default_value_t = 1000)]
    pub request_delay_mean_ms: u64,

    /// Print the last N recorded runs and exit.
    #[clap(long)]
    pub history: Option<usize>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            base_url: self.base_url.clone(),
            chart_name: self.chart_name.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            resume: self.resume,
            scrape_workers: self.scrape_workers,
            normalize_workers: self.normalize_workers,
            max_in_flight_requests: self.max_in_flight_requests,
            max_attempts: self.max_attempts,
            request_delay_mean_ms: self.request_delay_mean_ms,
        }
    }
}

fn print_history(store: &dyn ChartStore, limit: usize) -> Result<()> {
    for run in store.last_runs(limit)? {
        println!(
            "#{} {} {}..{} {} requested={} succeeded={} skipped={} persisted={} elapsed={:.1}s{}",
            run.id.unwrap_or_default(),
            run.chart_name,
            run.start_date,
            run.end_date,
            run.status.as_str(),
            run.requested,
            run.succeeded,
            run.skipped,
            run.persisted,
            run.elapsed.as_secs_f64(),
            run.error_message
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let today = chrono::Local::now().date_naive();
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config, today)?;

    info!("Opening chart database at {:?}...", config.db_path);
    let store = Arc::new(SqliteChartStore::new(&config.db_path)?);

    if let Some(limit) = cli_args.history {
        return print_history(store.as_ref(), limit);
    }

    let range = config.date_range()?;
    let range = if config.resume {
        match next_missing_date(store.as_ref(), &range)? {
            Some(start) => {
                info!("Resuming extraction from {}", start);
                config.date_range_from(start.date())?
            }
            None => {
                info!("Chart database is already up to date through {}", range.end());
                return Ok(());
            }
        }
    } else {
        range
    };

    let transport = Arc::new(ReqwestTransport::new(&config.transport_config())?);
    let client = RetryingHttpClient::new(
        transport,
        RetryPolicy::new(&config.retry),
        config.concurrency.max_in_flight_requests,
    );
    let context = ExtractionContext {
        client,
        parser: ChartPageParser::new(),
        pacer: RequestPacer::new(config.request_delay_mean()),
        base_url: config.base_url.clone(),
        chart_name: config.chart_name.clone(),
        loader: Some(store.clone() as Arc<dyn BatchLoader>),
    };
    let pipeline = ExtractionPipeline::new(context, config.pipeline_settings());

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling extraction");
                shutdown.cancel();
            }
        }
    });

    let started = Instant::now();
    match pipeline.run_until_cancelled(range, shutdown).await {
        Ok(outcome) => {
            outcome.report.log_summary();
            store.record_run(&ExtractionRun::from_report(&config.chart_name, &outcome.report))?;
            Ok(())
        }
        Err(err) => {
            let run = ExtractionRun::from_error(&config.chart_name, &range, &err, started.elapsed());
            if let Err(record_err) = store.record_run(&run) {
                error!("Failed to record extraction run: {:#}", record_err);
            }
            Err(err.into())
        }
    }
}
