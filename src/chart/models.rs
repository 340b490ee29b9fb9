//! Chart records as they move through extraction.

use super::ChartDate;

/// Number of ranked positions in a full chart.
pub const CHART_SIZE: u8 = 100;

/// One row lifted from a chart page before any artist handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChartEntry {
    pub position: u8,
    pub title: String,
    /// Unparsed credit text, e.g. "Artist A Featuring Artist B & Artist C".
    pub artist_credit: String,
}

/// All rows of one chart page, in ascending position order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChart {
    pub date: ChartDate,
    pub entries: Vec<RawChartEntry>,
}

impl ParsedChart {
    /// Whether all [`CHART_SIZE`] positions were found.
    pub fn is_complete(&self) -> bool {
        self.entries.len() == CHART_SIZE as usize
    }
}

/// Artist credit split into primary and featured performers.
///
/// Names are trimmed and kept in credit order. Duplicates are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedArtistGroup {
    pub main: Vec<String>,
    pub featuring: Vec<String>,
}

impl NormalizedArtistGroup {
    /// Canonical credit string: main names joined by "&", then "Featuring"
    /// and the featured names joined the same way.
    pub fn to_credit(&self) -> String {
        let main = self.main.join(" & ");
        if self.featuring.is_empty() {
            main
        } else {
            format!("{} Featuring {}", main, self.featuring.join(" & "))
        }
    }
}

/// A normalized, ranked row of a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartEntry {
    pub date: ChartDate,
    pub position: u8,
    pub title: String,
    pub main_artists: Vec<String>,
    pub featured_artists: Vec<String>,
}

impl ChartEntry {
    pub fn new(date: ChartDate, raw: RawChartEntry, artists: NormalizedArtistGroup) -> Self {
        Self {
            date,
            position: raw.position,
            title: raw.title,
            main_artists: artists.main,
            featured_artists: artists.featuring,
        }
    }

    /// Every credited artist, main first, in credit order.
    pub fn artists(&self) -> Vec<String> {
        self.main_artists
            .iter()
            .chain(self.featured_artists.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_to_credit_without_featuring() {
        let group = NormalizedArtistGroup {
            main: vec!["A".to_string(), "B".to_string()],
            featuring: vec![],
        };
        assert_eq!(group.to_credit(), "A & B");
    }

    #[test]
    fn test_to_credit_with_featuring() {
        let group = NormalizedArtistGroup {
            main: vec!["A".to_string()],
            featuring: vec!["B".to_string(), "C".to_string()],
        };
        assert_eq!(group.to_credit(), "A Featuring B & C");
    }

    #[test]
    fn test_entry_artists_lists_main_before_featured() {
        let date =
            ChartDate::from_publication_date(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()).unwrap();
        let entry = ChartEntry::new(
            date,
            RawChartEntry {
                position: 3,
                title: "Song".to_string(),
                artist_credit: "ignored".to_string(),
            },
            NormalizedArtistGroup {
                main: vec!["Main".to_string()],
                featuring: vec!["Guest".to_string()],
            },
        );
        assert_eq!(entry.position, 3);
        assert_eq!(entry.artists(), vec!["Main", "Guest"]);
    }
}
