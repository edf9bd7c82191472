use serde::{Deserialize, Serialize};

/// An archive entry exactly as scraped. Nothing here is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub section: String,
    pub title: String,
    pub raw_link: String,
}

impl RawRecord {
    pub fn new(section: impl Into<String>, title: impl Into<String>, raw_link: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            title: title.into(),
            raw_link: raw_link.into(),
        }
    }
}

/// A normalized archive entry, ready for per-record media scraping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreScrapingRecord {
    /// Re-extracted from the raw link, never copied from it
    pub id: u64,
    pub section: String,
    pub title: String,
    pub preacher: String,
    /// `base_url + "?id=" + id`
    pub canonical_link: String,
}

/// A pre-scraping record joined with its media links and transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    #[serde(flatten)]
    pub record: PreScrapingRecord,
    pub media_link: String,
    /// Derived from `media_link`
    pub audio_link: String,
    /// Derived from `media_link`
    pub caption_link: String,
    pub caption_text: String,
    /// Derived from `caption_text` by collapsing repeated captions
    pub transcript_text: String,
    pub content_fingerprint: u64,
}

impl TranscriptRecord {
    pub fn id(&self) -> u64 {
        self.record.id
    }
}

/// One embeddable piece of a transcript. Produced by the downstream chunking stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(flatten)]
    pub record: PreScrapingRecord,
    pub media_link: String,
    pub chunk: String,
}

/// Media fields fetched for one canonical link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedMedia {
    pub id: u64,
    pub media_link: String,
    pub caption_text: String,
}
