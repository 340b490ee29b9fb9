use super::locator::{EntryLocator, LocatedEntry, SelectorLocator};
use super::ParseError;
use crate::chart::{ChartDate, ParsedChart, RawChartEntry, CHART_SIZE};
use scraper::Html;
use tracing::warn;

/// Badges rendered inside the title cell for debuts and returns.
const TITLE_BADGES: [&str; 2] = ["RE-\nENTRY", "NEW"];

/// Extracts the ranked rows of one chart page.
///
/// Rows are probed by structural index from 1. Misses before the first row
/// are skipped (the list may open with non-row siblings); the first miss
/// after a row ends the chart. Probing stops early at position 100. A page
/// with no row within `probe_ceiling` indices is a placeholder or a changed
/// layout and is reported as [`ParseError::MalformedPage`].
#[derive(Debug, Clone)]
pub struct ChartPageParser {
    probe_ceiling: usize,
}

impl Default for ChartPageParser {
    fn default() -> Self {
        Self {
            probe_ceiling: Self::DEFAULT_PROBE_CEILING,
        }
    }
}

impl ChartPageParser {
    pub const DEFAULT_PROBE_CEILING: usize = 150;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe_ceiling(probe_ceiling: usize) -> Self {
        Self { probe_ceiling }
    }

    pub fn probe_ceiling(&self) -> usize {
        self.probe_ceiling
    }

    pub fn parse(&self, html: &[u8], date: ChartDate) -> Result<ParsedChart, ParseError> {
        let text = String::from_utf8_lossy(html);
        let document = Html::parse_document(&text);
        self.parse_with(&SelectorLocator::new(&document), date)
    }

    pub fn parse_with<L: EntryLocator + ?Sized>(
        &self,
        locator: &L,
        date: ChartDate,
    ) -> Result<ParsedChart, ParseError> {
        let mut entries: Vec<RawChartEntry> = Vec::with_capacity(CHART_SIZE as usize);

        for index in 1..=self.probe_ceiling {
            let Some(located) = locator.locate(index)? else {
                if entries.is_empty() {
                    continue;
                }
                break;
            };

            let entry = validate_entry(index, located)?;
            if let Some(previous) = entries.last() {
                if entry.position <= previous.position {
                    return Err(ParseError::PositionOutOfOrder {
                        previous: previous.position,
                        found: entry.position,
                    });
                }
            }

            let complete = entry.position == CHART_SIZE;
            entries.push(entry);
            if complete || entries.len() == CHART_SIZE as usize {
                break;
            }
        }

        if entries.is_empty() {
            return Err(ParseError::MalformedPage {
                date,
                probed: self.probe_ceiling,
            });
        }

        let chart = ParsedChart { date, entries };
        if !chart.is_complete() {
            warn!(
                "Chart {} ended after {} of {} entries",
                date,
                chart.entries.len(),
                CHART_SIZE
            );
        }
        Ok(chart)
    }
}

fn validate_entry(index: usize, located: LocatedEntry) -> Result<RawChartEntry, ParseError> {
    let position_text = located.position.trim();
    let position = position_text
        .parse::<u8>()
        .ok()
        .filter(|p| (1..=CHART_SIZE).contains(p))
        .ok_or_else(|| ParseError::InvalidPosition {
            index,
            text: position_text.to_string(),
        })?;

    let title = clean_title(&located.title);
    if title.is_empty() {
        return Err(ParseError::EmptyTitle(position));
    }

    let artist_credit = collapse_whitespace(&located.artist);
    if artist_credit.is_empty() {
        return Err(ParseError::EmptyArtist(position));
    }

    Ok(RawChartEntry {
        position,
        title,
        artist_credit,
    })
}

/// Drop debut/return badges, then normalize whitespace.
pub fn clean_title(raw: &str) -> String {
    let stripped = TITLE_BADGES
        .iter()
        .fold(raw.to_string(), |title, badge| title.replace(badge, ""));
    collapse_whitespace(&stripped)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
