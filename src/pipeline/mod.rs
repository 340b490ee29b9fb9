//! The concurrent extraction pipeline.

mod counter;
mod extraction;
mod progress;
mod report;

pub use counter::{CounterError, ProgressCounter};
pub use extraction::{
    ExtractionContext, ExtractionOutcome, ExtractionPipeline, PipelineError, PipelineSettings,
    PipelineState,
};
pub use progress::{ProgressReporter, ProgressSnapshot, MIN_PROGRESS_INTERVAL};
pub use report::{
    detect_page_shape_change, PageShapeWarning, RunReport, RunStatus, SkipReason, SkippedChart,
    MIN_ESCALATION_STREAK,
};
