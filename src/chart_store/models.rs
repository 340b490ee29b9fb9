use crate::chart::{ChartDate, DateRange};
use crate::pipeline::{PipelineError, RunReport, RunStatus};
use std::time::Duration;

/// Row of the `extraction_runs` history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRun {
    pub id: Option<i64>,
    pub chart_name: String,
    pub start_date: ChartDate,
    pub end_date: ChartDate,
    pub requested: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub persisted: usize,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub elapsed: Duration,
}

impl ExtractionRun {
    pub fn from_report(chart_name: &str, report: &RunReport) -> Self {
        Self {
            id: None,
            chart_name: chart_name.to_string(),
            start_date: report.start,
            end_date: report.end,
            requested: report.requested,
            succeeded: report.succeeded,
            skipped: report.skipped.len(),
            persisted: report.persisted_charts,
            status: RunStatus::Completed,
            error_message: report.page_shape_warning.as_ref().map(|w| w.to_string()),
            elapsed: report.elapsed,
        }
    }

    /// A run that ended with `error` before producing a report.
    pub fn from_error(
        chart_name: &str,
        range: &DateRange,
        error: &PipelineError,
        elapsed: Duration,
    ) -> Self {
        let status = match error {
            PipelineError::Cancelled { .. } => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        };
        Self {
            id: None,
            chart_name: chart_name.to_string(),
            start_date: range.start(),
            end_date: range.end(),
            requested: range.chart_count(),
            succeeded: 0,
            skipped: 0,
            persisted: error.persisted_charts(),
            status,
            error_message: Some(error.to_string()),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::WeekdayRounding;
    use crate::pipeline::CounterError;

    fn range() -> DateRange {
        let start = ChartDate::parse_iso("2024-01-06").unwrap();
        let end = ChartDate::parse_iso("2024-02-03").unwrap();
        DateRange::new(start.date(), end.date(), WeekdayRounding::Backward).unwrap()
    }

    #[test]
    fn test_failed_run_keeps_durable_chart_count() {
        let errors = [
            PipelineError::Counter {
                persisted_charts: 3,
                source: CounterError::Overflow {
                    attempted: 6,
                    stop_at: 5,
                },
            },
            PipelineError::Worker {
                persisted_charts: 3,
                message: "task panicked".to_string(),
            },
            PipelineError::Persistence {
                persisted_charts: 3,
                source: anyhow::anyhow!("disk full"),
            },
        ];

        for error in &errors {
            let run = ExtractionRun::from_error("hot-100", &range(), error, Duration::from_secs(1));
            assert_eq!(run.persisted, 3, "error: {}", error);
            assert_eq!(run.status, RunStatus::Failed);
            assert_eq!(run.requested, 5);
            assert!(run.error_message.is_some());
        }
    }

    #[test]
    fn test_cancelled_run_status() {
        let error = PipelineError::Cancelled {
            persisted_charts: 2,
        };
        let run = ExtractionRun::from_error("hot-100", &range(), &error, Duration::ZERO);
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.persisted, 2);
    }
}
