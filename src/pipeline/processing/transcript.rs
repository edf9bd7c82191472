use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::domain::{FetchedMedia, PreScrapingRecord, TranscriptRecord};
use crate::error::{Result, ScraperError};
use crate::metrics as metric_names;
use crate::pipeline::processing::parser::captions;
use crate::pipeline::processing::schema::full_match;

/// Swap a trailing extension. `None` when `link` does not end with `from`.
pub fn replace_suffix(link: &str, from: &str, to: &str) -> Option<String> {
    link.strip_suffix(from).map(|stem| format!("{}{}", stem, to))
}

/// First eight bytes of the SHA-256 of `text`, big-endian.
pub fn content_fingerprint(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Derives the audio and caption links from a media link.
#[derive(Debug, Clone)]
pub struct LinkDeriver {
    pub media_extension: String,
    pub audio_extension: String,
    pub caption_extension: String,
}

impl LinkDeriver {
    pub fn from_config(config: &Config) -> Self {
        Self {
            media_extension: config.media.media.clone(),
            audio_extension: config.media.audio.clone(),
            caption_extension: config.media.caption.clone(),
        }
    }

    pub fn audio_link(&self, media_link: &str) -> Result<String> {
        self.derive(media_link, &self.audio_extension)
    }

    pub fn caption_link(&self, media_link: &str) -> Result<String> {
        self.derive(media_link, &self.caption_extension)
    }

    fn derive(&self, media_link: &str, to: &str) -> Result<String> {
        replace_suffix(media_link, &self.media_extension, to).ok_or_else(|| {
            ScraperError::MissingField(format!(
                "media link '{}' does not end with '{}'",
                media_link, self.media_extension
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    pub deriver: LinkDeriver,
    pub media_pattern: Regex,
    pub audio_pattern: Regex,
    pub caption_pattern: Regex,
    pub min_text_chars: usize,
}

impl AssemblerSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            deriver: LinkDeriver::from_config(config),
            media_pattern: Regex::new(&config.patterns.media)?,
            audio_pattern: Regex::new(&config.patterns.audio)?,
            caption_pattern: Regex::new(&config.patterns.caption)?,
            min_text_chars: config.validation.min_text_chars,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    DuplicateId,
    UnderivableMediaLink,
    MediaPatternMismatch,
    AudioPatternMismatch,
    CaptionPatternMismatch,
    EmptyTranscript,
    CaptionTooShort,
    TranscriptTooShort,
    DuplicateMediaLink,
    DuplicateFingerprint,
}

/// A record the assembler dropped, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub id: u64,
    pub reason: RejectionReason,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyOutcome {
    pub records: Vec<TranscriptRecord>,
    pub rejections: Vec<Rejection>,
    /// Pre-scraping records with no fetched media (fetch failed or outside the fetch limit)
    pub without_media: usize,
}

/// Joins fetched media onto the pre-scraping table and removes collisions.
///
/// Processing follows the pre-scraping table's order, so the first record
/// carrying a media link or fingerprint is the one that survives.
pub struct TranscriptAssembler {
    settings: AssemblerSettings,
}

impl TranscriptAssembler {
    pub fn new(settings: AssemblerSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(AssemblerSettings::from_config(config)?))
    }

    #[instrument(skip(self, records, media), fields(records = records.len(), media = media.len()))]
    pub fn assemble(&self, records: &[PreScrapingRecord], media: &[FetchedMedia]) -> AssemblyOutcome {
        let media_by_id: HashMap<u64, &FetchedMedia> = media.iter().map(|m| (m.id, m)).collect();
        let mut outcome = AssemblyOutcome::default();
        let mut seen_ids = HashSet::new();
        let mut seen_media = HashSet::new();
        let mut seen_fingerprints = HashSet::new();

        for record in records {
            let Some(fetched) = media_by_id.get(&record.id) else {
                outcome.without_media += 1;
                continue;
            };
            let built = match self.build(record, fetched) {
                Ok(built) => built,
                Err(rejection) => {
                    outcome.rejections.push(rejection);
                    continue;
                }
            };

            let collision = if !seen_ids.insert(built.record.id) {
                Some((RejectionReason::DuplicateId, format!("id {} already assembled", built.record.id)))
            } else if seen_media.contains(&built.media_link) {
                Some((RejectionReason::DuplicateMediaLink, built.media_link.clone()))
            } else if seen_fingerprints.contains(&built.content_fingerprint) {
                Some((
                    RejectionReason::DuplicateFingerprint,
                    format!("fingerprint {}", built.content_fingerprint),
                ))
            } else {
                None
            };
            if let Some((reason, detail)) = collision {
                debug!(id = record.id, ?reason, "Dropping duplicate");
                outcome.rejections.push(Rejection {
                    id: record.id,
                    reason,
                    detail,
                });
                continue;
            }

            seen_media.insert(built.media_link.clone());
            seen_fingerprints.insert(built.content_fingerprint);
            outcome.records.push(built);
        }

        metrics::counter!(metric_names::TRANSCRIPTS_EMITTED).increment(outcome.records.len() as u64);
        metrics::counter!(metric_names::RECORDS_REJECTED).increment(outcome.rejections.len() as u64);
        info!(
            "Assembled {} transcript record(s); {} rejected, {} without media",
            outcome.records.len(),
            outcome.rejections.len(),
            outcome.without_media
        );
        outcome
    }

    fn build(
        &self,
        record: &PreScrapingRecord,
        fetched: &FetchedMedia,
    ) -> std::result::Result<TranscriptRecord, Rejection> {
        let reject = |reason: RejectionReason, detail: String| Rejection {
            id: record.id,
            reason,
            detail,
        };
        let media_link = fetched.media_link.trim().to_string();

        let audio_link = self
            .settings
            .deriver
            .audio_link(&media_link)
            .map_err(|e| reject(RejectionReason::UnderivableMediaLink, e.to_string()))?;
        let caption_link = self
            .settings
            .deriver
            .caption_link(&media_link)
            .map_err(|e| reject(RejectionReason::UnderivableMediaLink, e.to_string()))?;

        if !full_match(&self.settings.media_pattern, &media_link) {
            return Err(reject(RejectionReason::MediaPatternMismatch, media_link));
        }
        if !full_match(&self.settings.audio_pattern, &audio_link) {
            return Err(reject(RejectionReason::AudioPatternMismatch, audio_link));
        }
        if !full_match(&self.settings.caption_pattern, &caption_link) {
            return Err(reject(RejectionReason::CaptionPatternMismatch, caption_link));
        }

        let caption_text = fetched.caption_text.clone();
        let transcript_text = captions::caption_text_to_transcript(&caption_text);
        let min = self.settings.min_text_chars;

        if transcript_text.is_empty() || transcript_text == "." {
            return Err(reject(RejectionReason::EmptyTranscript, format!("'{}'", transcript_text)));
        }
        let caption_len = caption_text.chars().count();
        if caption_len < min {
            return Err(reject(
                RejectionReason::CaptionTooShort,
                format!("{} chars, minimum {}", caption_len, min),
            ));
        }
        let transcript_len = transcript_text.chars().count();
        if transcript_len < min {
            return Err(reject(
                RejectionReason::TranscriptTooShort,
                format!("{} chars, minimum {}", transcript_len, min),
            ));
        }

        Ok(TranscriptRecord {
            record: record.clone(),
            content_fingerprint: content_fingerprint(&transcript_text),
            media_link,
            audio_link,
            caption_link,
            caption_text,
            transcript_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_text_chars: usize) -> Config {
        let mut config = Config::from_toml_str(
            "disallowed_sections = []\n[section_preachers]\n\"sermons\" = \"evaluate\"\n",
        )
        .unwrap();
        config.validation.min_text_chars = min_text_chars;
        config
    }

    fn record(id: u64) -> PreScrapingRecord {
        PreScrapingRecord {
            id,
            section: "sermons".to_string(),
            title: format!("sermon {}", id),
            preacher: "pastor steven anderson".to_string(),
            canonical_link: format!("https://allthepreaching.com/pages/video.php?id={}", id),
        }
    }

    fn vtt(lines: &[&str]) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for (i, line) in lines.iter().enumerate() {
            out.push_str(&format!("00:00:{:02}.000 --> 00:00:{:02}.000\n{}\n\n", i, i + 1, line));
        }
        out
    }

    fn media(id: u64, media_link: &str, text: &[&str]) -> FetchedMedia {
        FetchedMedia {
            id,
            media_link: media_link.to_string(),
            caption_text: vtt(text),
        }
    }

    #[test]
    fn test_derivation_replaces_only_trailing_extension() {
        let deriver = LinkDeriver::from_config(&config(5));
        let link = "https://cdn.example.com/mp4/sermon.mp4.backup/10.mp4";
        assert_eq!(
            deriver.audio_link(link).unwrap(),
            "https://cdn.example.com/mp4/sermon.mp4.backup/10.mp3"
        );
        assert_eq!(
            deriver.caption_link(link).unwrap(),
            "https://cdn.example.com/mp4/sermon.mp4.backup/10.vtt"
        );
        assert!(deriver.audio_link("https://cdn.example.com/10.webm").is_err());
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(content_fingerprint("hello world"), content_fingerprint("hello world"));
        assert_ne!(content_fingerprint("hello world"), content_fingerprint("hello world!"));
    }

    #[test]
    fn test_assemble_builds_transcript_records() {
        let assembler = TranscriptAssembler::from_config(&config(5)).unwrap();
        let outcome = assembler.assemble(
            &[record(1)],
            &[media(1, "https://cdn.example.com/v/1.mp4", &["hello", "hello", "world"])],
        );
        assert!(outcome.rejections.is_empty());
        let built = &outcome.records[0];
        assert_eq!(built.audio_link, "https://cdn.example.com/v/1.mp3");
        assert_eq!(built.caption_link, "https://cdn.example.com/v/1.vtt");
        assert_eq!(built.transcript_text, "hello world");
        assert_eq!(built.content_fingerprint, content_fingerprint("hello world"));
    }

    #[test]
    fn test_shared_transcript_keeps_first_only() {
        let assembler = TranscriptAssembler::from_config(&config(5)).unwrap();
        let outcome = assembler.assemble(
            &[record(1), record(2)],
            &[
                media(1, "https://cdn.example.com/v/1.mp4", &["the same sermon text"]),
                media(2, "https://cdn.example.com/v/2.mp4", &["the same sermon text"]),
            ],
        );
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].id(), 1);
        assert_eq!(outcome.rejections[0].id, 2);
        assert_eq!(outcome.rejections[0].reason, RejectionReason::DuplicateFingerprint);
    }

    #[test]
    fn test_duplicate_media_link_keeps_first() {
        let assembler = TranscriptAssembler::from_config(&config(5)).unwrap();
        let outcome = assembler.assemble(
            &[record(1), record(2)],
            &[
                media(1, "https://cdn.example.com/v/1.mp4", &["first sermon"]),
                media(2, "https://cdn.example.com/v/1.mp4", &["second sermon"]),
            ],
        );
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.rejections[0].reason, RejectionReason::DuplicateMediaLink);
    }

    #[test]
    fn test_short_and_empty_transcripts_are_rejected() {
        let assembler = TranscriptAssembler::from_config(&config(20)).unwrap();
        let outcome = assembler.assemble(
            &[record(1), record(2)],
            &[
                media(1, "https://cdn.example.com/v/1.mp4", &["."]),
                media(2, "https://cdn.example.com/v/2.mp4", &["amen"]),
            ],
        );
        assert!(outcome.records.is_empty());
        let reasons: Vec<_> = outcome.rejections.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![RejectionReason::EmptyTranscript, RejectionReason::TranscriptTooShort]
        );
    }

    #[test]
    fn test_pattern_and_derivation_failures_are_rejected() {
        let assembler = TranscriptAssembler::from_config(&config(5)).unwrap();
        let outcome = assembler.assemble(
            &[record(1), record(2), record(3)],
            &[
                media(1, "https://cdn.example.com/v/1.webm", &["some sermon text"]),
                media(2, "not a url at all.mp4", &["other sermon text"]),
            ],
        );
        let reasons: Vec<_> = outcome.rejections.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![RejectionReason::UnderivableMediaLink, RejectionReason::MediaPatternMismatch]
        );
        assert_eq!(outcome.without_media, 1);
    }
}
