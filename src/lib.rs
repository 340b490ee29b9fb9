//! Weekly chart history extraction.
//!
//! Scrapes ranked chart pages for a range of publication dates, normalizes
//! artist credits and loads the rows into SQLite.

pub mod artists;
pub mod chart;
pub mod chart_store;
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod pipeline;
pub mod sqlite_persistence;

pub use chart::{ChartDate, ChartEntry, DateRange, NormalizedArtistGroup};
pub use chart_store::{BatchLoader, ChartStore, SqliteChartStore};
pub use pipeline::{ExtractionPipeline, PipelineError, RunReport};
