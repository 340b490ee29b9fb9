//! Outcome of one extraction run.

use crate::chart::ChartDate;
use crate::fetcher::FetchError;
use crate::parser::ParseError;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Shortest malformed streak that can raise a page-shape warning.
///
/// Keeps one bad week in a tiny run from looking like a layout change.
pub const MIN_ESCALATION_STREAK: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Fetch failed after retries. `status` is absent for transport faults.
    Fetch {
        status: Option<u16>,
        attempts: u32,
        message: String,
    },
    /// No chart rows found on the page.
    MalformedPage,
    /// Rows were found but failed validation.
    InvalidPage(String),
}

impl From<&FetchError> for SkipReason {
    fn from(err: &FetchError) -> Self {
        SkipReason::Fetch {
            status: err.status(),
            attempts: err.attempts(),
            message: err.to_string(),
        }
    }
}

impl From<&ParseError> for SkipReason {
    fn from(err: &ParseError) -> Self {
        if err.is_malformed_page() {
            SkipReason::MalformedPage
        } else {
            SkipReason::InvalidPage(err.to_string())
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Fetch { message, .. } => write!(f, "fetch failed: {}", message),
            SkipReason::MalformedPage => write!(f, "malformed page"),
            SkipReason::InvalidPage(message) => write!(f, "invalid page: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChart {
    pub date: ChartDate,
    pub reason: SkipReason,
}

/// Many consecutive weeks came back without chart rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageShapeWarning {
    pub first: ChartDate,
    pub last: ChartDate,
    pub streak: usize,
    pub requested: usize,
}

impl fmt::Display for PageShapeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} consecutive malformed pages ({} to {}) out of {} requested; chart selectors may need updating",
            self.streak, self.first, self.last, self.requested
        )
    }
}

/// Longest run of consecutive malformed weeks, if it reaches `ratio` of the
/// requested charts (and at least [`MIN_ESCALATION_STREAK`] weeks).
pub fn detect_page_shape_change(
    skipped: &[SkippedChart],
    requested: usize,
    ratio: f64,
) -> Option<PageShapeWarning> {
    let mut malformed: Vec<ChartDate> = skipped
        .iter()
        .filter(|s| s.reason == SkipReason::MalformedPage)
        .map(|s| s.date)
        .collect();
    malformed.sort();
    malformed.dedup();

    let mut best: Option<(ChartDate, ChartDate, usize)> = None;
    let mut current: Option<(ChartDate, ChartDate, usize)> = None;
    for date in malformed {
        current = match current {
            Some((first, last, len)) if last.next_week() == date => Some((first, date, len + 1)),
            _ => Some((date, date, 1)),
        };
        if current.map(|c| c.2) > best.map(|b| b.2) {
            best = current;
        }
    }

    let (first, last, streak) = best?;
    let threshold = (requested as f64 * ratio).ceil() as usize;
    (streak >= threshold.max(MIN_ESCALATION_STREAK)).then_some(PageShapeWarning {
        first,
        last,
        streak,
        requested,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }
}

/// Totals of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub start: ChartDate,
    pub end: ChartDate,
    pub requested: usize,
    pub succeeded: usize,
    /// Sorted by date.
    pub skipped: Vec<SkippedChart>,
    /// Charts handed to the loader and acknowledged.
    pub persisted_charts: usize,
    pub persisted_entries: usize,
    pub elapsed: Duration,
    pub page_shape_warning: Option<PageShapeWarning>,
}

impl RunReport {
    pub fn skipped_dates(&self) -> Vec<ChartDate> {
        self.skipped.iter().map(|s| s.date).collect()
    }

    pub fn log_summary(&self) {
        info!(
            "Extraction {} to {} finished in {:.1}s: {} requested, {} succeeded, {} skipped, {} persisted",
            self.start,
            self.end,
            self.elapsed.as_secs_f64(),
            self.requested,
            self.succeeded,
            self.skipped.len(),
            self.persisted_charts
        );
        for skipped in &self.skipped {
            info!("  skipped {}: {}", skipped.date, skipped.reason);
        }
        if let Some(warning) = &self.page_shape_warning {
            warn!("Possible page-shape change: {}", warning);
        }
    }
}
