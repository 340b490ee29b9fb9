//! Chart page parsing.

mod locator;
mod page_parser;

pub use locator::{EntryLocator, LocatedEntry, SelectorLocator};
pub use page_parser::{clean_title, ChartPageParser};

use crate::chart::ChartDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed chart page for {date}: no rows within {probed} probed indices")]
    MalformedPage { date: ChartDate, probed: usize },
    #[error("Invalid position label {text:?} at row index {index}")]
    InvalidPosition { index: usize, text: String },
    #[error("Position {found} follows position {previous}")]
    PositionOutOfOrder { previous: u8, found: u8 },
    #[error("Empty title at position {0}")]
    EmptyTitle(u8),
    #[error("Empty artist credit at position {0}")]
    EmptyArtist(u8),
    #[error("Invalid selector: {0}")]
    Selector(String),
}

impl ParseError {
    /// Whether the page as a whole did not look like a chart.
    pub fn is_malformed_page(&self) -> bool {
        matches!(self, ParseError::MalformedPage { .. })
    }
}
