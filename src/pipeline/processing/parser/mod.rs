//! HTML extraction for the archive page and per-record detail pages.

pub mod captions;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::domain::RawRecord;
use crate::error::{Result, ScraperError};

static SECTION_OR_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("h2, a").expect("static selector"));
static VIDEO: Lazy<Selector> = Lazy::new(|| Selector::parse("video").expect("static selector"));
static SOURCE: Lazy<Selector> = Lazy::new(|| Selector::parse("source[src]").expect("static selector"));

/// Pull `{section, title, raw_link}` entries out of the archive page.
///
/// The page alternates `h2` section headers with anchor-tagged entries. An anchor
/// only counts when it carries both a non-empty `title` and `href`; anchors that
/// appear before the first header have no section and are skipped.
pub fn extract_records(html: &str) -> Vec<RawRecord> {
    let document = Html::parse_document(html);
    let mut current_section: Option<String> = None;
    let mut records = Vec::new();
    let mut orphaned = 0usize;

    for element in document.select(&SECTION_OR_LINK) {
        match element.value().name() {
            "h2" => {
                current_section = Some(element_text(&element).to_lowercase());
            }
            "a" => {
                let title = element.value().attr("title").unwrap_or_default();
                let href = element.value().attr("href").unwrap_or_default();
                if title.is_empty() || href.is_empty() {
                    continue;
                }
                let Some(section) = &current_section else {
                    orphaned += 1;
                    continue;
                };
                records.push(RawRecord {
                    section: section.clone(),
                    title: clean_title(title),
                    raw_link: href.to_string(),
                });
            }
            _ => {}
        }
    }

    if orphaned > 0 {
        debug!("Skipped {} anchors that appear before any section header", orphaned);
    }
    info!("Extracted {} raw records from archive page", records.len());
    records
}

/// Source URL of the first `video` element on a detail page.
pub fn extract_media_link(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let video = document
        .select(&VIDEO)
        .next()
        .ok_or_else(|| ScraperError::MissingField("video element".into()))?;

    if let Some(src) = video.value().attr("src").filter(|s| !s.trim().is_empty()) {
        return Ok(src.trim().to_string());
    }
    video
        .select(&SOURCE)
        .filter_map(|s| s.value().attr("src"))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ScraperError::MissingField("video src attribute".into()))
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn clean_title(title: &str) -> String {
    title.trim_matches(|c| c == '\'' || c == '"' || c == ' ').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCHIVE: &str = r#"
        <html><body>
          <a title="orphan" href="video.php?id=1">orphan</a>
          <h2> Sermons Pastor Anderson </h2>
          <a title="'The Gospel'" href="video.php?id=10">The Gospel</a>
          <a href="video.php?id=11">No title attribute</a>
          <a title="Missing href">Missing href</a>
          <h2>Music</h2>
          <a title="Hymn" href="https://allthepreaching.com/pages/video.php?id=12">Hymn</a>
        </body></html>
    "#;

    #[test]
    fn test_extract_records_tracks_sections() {
        let records = extract_records(ARCHIVE);
        assert_eq!(
            records,
            vec![
                RawRecord::new("sermons pastor anderson", "the gospel", "video.php?id=10"),
                RawRecord::new("music", "hymn", "https://allthepreaching.com/pages/video.php?id=12"),
            ]
        );
    }

    #[test]
    fn test_extract_records_empty_page() {
        assert!(extract_records("<html><body><p>nothing</p></body></html>").is_empty());
    }

    #[test]
    fn test_extract_media_link_from_src() {
        let html = r#"<div><video controls src="https://cdn.example.com/v/10.mp4"></video>
                      <video src="https://cdn.example.com/v/other.mp4"></video></div>"#;
        assert_eq!(extract_media_link(html).unwrap(), "https://cdn.example.com/v/10.mp4");
    }

    #[test]
    fn test_extract_media_link_from_source_child() {
        let html = r#"<video controls><source src="https://cdn.example.com/v/10.mp4" type="video/mp4"></video>"#;
        assert_eq!(extract_media_link(html).unwrap(), "https://cdn.example.com/v/10.mp4");
    }

    #[test]
    fn test_extract_media_link_missing_video() {
        let result = extract_media_link("<html><body>404 Not Found</body></html>");
        assert!(matches!(result, Err(ScraperError::MissingField(_))));
    }
}
