//! Persistence of normalized chart entries and run history.

mod models;
mod schema;
mod sqlite_chart_store;

pub use models::ExtractionRun;
pub use schema::CHART_VERSIONED_SCHEMAS;
pub use sqlite_chart_store::SqliteChartStore;

use crate::chart::{ChartDate, ChartEntry, DateRange};
use anyhow::Result;
use std::collections::BTreeSet;

/// Sink for normalized entries.
///
/// Loading is an upsert on (date, position): loading the same chart twice
/// leaves one row per position.
pub trait BatchLoader: Send + Sync {
    /// Returns the number of rows written.
    fn load_batch(&self, entries: &[ChartEntry]) -> Result<usize>;
}

pub trait ChartStore: BatchLoader {
    fn latest_chart_date(&self) -> Result<Option<ChartDate>>;
    /// Distinct chart dates with at least one stored row, within `range`.
    fn stored_dates(&self, range: &DateRange) -> Result<BTreeSet<ChartDate>>;
    fn count_entries(&self) -> Result<usize>;
    /// Entries of one chart in position order.
    fn get_chart(&self, date: ChartDate) -> Result<Vec<ChartEntry>>;

    fn record_run(&self, run: &ExtractionRun) -> Result<i64>;
    /// Most recent runs first.
    fn last_runs(&self, limit: usize) -> Result<Vec<ExtractionRun>>;
}

/// Earliest week of `range` with no stored rows, or `None` when every week
/// is stored.
///
/// Charts are persisted in no particular order and an aborted run drops its
/// unflushed batches, so stored weeks can have gaps below the newest one.
pub fn next_missing_date(store: &dyn ChartStore, range: &DateRange) -> Result<Option<ChartDate>> {
    let stored = store.stored_dates(range)?;
    Ok(range.dates().find(|date| !stored.contains(date)))
}
