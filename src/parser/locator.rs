//! Page-shape contract: where the labels of one chart row live.

use super::ParseError;
use scraper::{ElementRef, Html, Selector};

/// Text of the three labels of one row, as found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedEntry {
    pub position: String,
    pub title: String,
    pub artist: String,
}

/// Finds the labels of the row container at a 1-based structural index.
///
/// Returns `Ok(None)` when no container exists at `index`.
pub trait EntryLocator {
    fn locate(&self, index: usize) -> Result<Option<LocatedEntry>, ParseError>;
}

const ROW_CONTAINER: &str = "div.o-chart-results-list-row-container";
const POSITION_PATH: &str = "ul:nth-child(1) > li:nth-child(1) > span:nth-child(1)";
const TITLE_PATH: &str = "ul:nth-child(1) > li:nth-child(4) > ul:nth-child(1) > li:nth-child(1) > h3:nth-child(1)";
const ARTIST_PATH: &str = "ul:nth-child(1) > li:nth-child(4) > ul:nth-child(1) > li:nth-child(1) > span:nth-child(2)";

/// [`EntryLocator`] over a parsed HTML document using the chart site's
/// positional selectors.
pub struct SelectorLocator<'a> {
    document: &'a Html,
}

impl<'a> SelectorLocator<'a> {
    pub fn new(document: &'a Html) -> Self {
        Self { document }
    }

    fn first(&self, selector: &str) -> Result<Option<ElementRef<'a>>, ParseError> {
        let selector =
            Selector::parse(selector).map_err(|e| ParseError::Selector(e.to_string()))?;
        Ok(self.document.select(&selector).next())
    }

    fn label(&self, container: &str, path: &str) -> Result<String, ParseError> {
        Ok(self
            .first(&format!("{} > {}", container, path))?
            .map(|element| element.text().collect::<String>())
            .unwrap_or_default())
    }
}

impl EntryLocator for SelectorLocator<'_> {
    fn locate(&self, index: usize) -> Result<Option<LocatedEntry>, ParseError> {
        let container = format!("{}:nth-child({})", ROW_CONTAINER, index);
        if self.first(&container)?.is_none() {
            return Ok(None);
        }

        // Missing labels inside an existing container come back empty and are
        // rejected by validation.
        Ok(Some(LocatedEntry {
            position: self.label(&container, POSITION_PATH)?,
            title: self.label(&container, TITLE_PATH)?,
            artist: self.label(&container, ARTIST_PATH)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &str = r#"
        <div class="o-chart-results-list-row-container">
          <ul class="o-chart-results-list-row">
            <li><span class="c-label">7</span><span>-</span></li>
            <li></li>
            <li></li>
            <li>
              <ul>
                <li><h3 class="c-title">Song Title</h3><span class="c-label">The Artist</span></li>
              </ul>
            </li>
          </ul>
        </div>"#;

    #[test]
    fn test_locates_labels_by_structure() {
        let html = format!("<html><body><div class=\"chart\">{}</div></body></html>", ROW);
        let document = Html::parse_document(&html);
        let locator = SelectorLocator::new(&document);

        let entry = locator.locate(1).unwrap().unwrap();
        assert_eq!(entry.position.trim(), "7");
        assert_eq!(entry.title.trim(), "Song Title");
        assert_eq!(entry.artist.trim(), "The Artist");
    }

    #[test]
    fn test_missing_container_is_none() {
        let html = format!("<html><body><div class=\"chart\">{}</div></body></html>", ROW);
        let document = Html::parse_document(&html);
        let locator = SelectorLocator::new(&document);

        assert!(locator.locate(2).unwrap().is_none());
    }

    #[test]
    fn test_index_counts_all_siblings() {
        let html = format!(
            "<html><body><div class=\"chart\"><div class=\"ad\"></div>{}</div></body></html>",
            ROW
        );
        let document = Html::parse_document(&html);
        let locator = SelectorLocator::new(&document);

        assert!(locator.locate(1).unwrap().is_none());
        assert!(locator.locate(2).unwrap().is_some());
    }
}
