//! Periodic progress logging for a running extraction.

use super::ProgressCounter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shortest period between progress lines.
pub const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub done: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done as f64 * 100.0 / self.total as f64
    }

    /// Charts per second so far.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.done as f64 / secs
    }

    /// Remaining time at the current rate, if any progress was made.
    pub fn eta(&self) -> Option<Duration> {
        let rate = self.rate();
        if rate <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.done) as f64;
        Some(Duration::from_secs_f64(remaining / rate))
    }
}

/// Reads the shared counter on a fixed interval and logs it.
///
/// Never writes to the counter.
pub struct ProgressReporter {
    counter: Arc<ProgressCounter>,
    interval: Duration,
}

impl ProgressReporter {
    /// `interval` is raised to [`MIN_PROGRESS_INTERVAL`] if shorter.
    pub fn new(counter: Arc<ProgressCounter>, interval: Duration) -> Self {
        Self {
            counter,
            interval: interval.max(MIN_PROGRESS_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn snapshot(&self, started: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            done: self.counter.value().await,
            total: self.counter.stop_at(),
            elapsed: started.elapsed(),
        }
    }

    /// Log until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.snapshot(started).await;
                    info!(
                        "Scraped {}/{} charts ({:.1}%, {:.2} charts/s, eta {})",
                        snapshot.done,
                        snapshot.total,
                        snapshot.percent(),
                        snapshot.rate(),
                        snapshot
                            .eta()
                            .map(|eta| format!("{}s", eta.as_secs()))
                            .unwrap_or_else(|| "unknown".to_string()),
                    );
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_math() {
        let snapshot = ProgressSnapshot {
            done: 25,
            total: 100,
            elapsed: Duration::from_secs(50),
        };
        assert_eq!(snapshot.percent(), 25.0);
        assert_eq!(snapshot.rate(), 0.5);
        assert_eq!(snapshot.eta(), Some(Duration::from_secs(150)));
    }

    #[test]
    fn test_snapshot_without_progress_has_no_eta() {
        let snapshot = ProgressSnapshot {
            done: 0,
            total: 10,
            elapsed: Duration::from_secs(5),
        };
        assert_eq!(snapshot.eta(), None);
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let counter = Arc::new(ProgressCounter::new(1));
        let reporter = ProgressReporter::new(counter, Duration::ZERO);
        assert_eq!(reporter.interval(), MIN_PROGRESS_INTERVAL);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(reporter.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_reporter_reads_counter_and_stops_on_cancel() {
        let counter = Arc::new(ProgressCounter::new(10));
        counter.increment().await.unwrap();
        let reporter = ProgressReporter::new(counter.clone(), Duration::from_millis(5));

        let snapshot = reporter.snapshot(Instant::now()).await;
        assert_eq!(snapshot.done, 1);
        assert_eq!(snapshot.total, 10);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(reporter.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counter.value().await, 1);
    }
}
