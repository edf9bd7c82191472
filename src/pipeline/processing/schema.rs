//! Record shapes as explicit field rules.
//!
//! A [`Schema`] is a list of [`FieldRule`]s evaluated against a whole table so
//! that uniqueness can see every row. Evaluation never fails: every broken
//! constraint becomes a [`Violation`].

use regex::Regex;
use std::collections::HashMap;

use crate::config::Config;
use crate::constants;
use crate::domain::{ChunkRecord, PreScrapingRecord, TranscriptRecord};
use crate::error::Result;
use crate::pipeline::processing::parser::captions;
use crate::pipeline::processing::quality_gate::{Severity, Violation, ViolationKind};
use crate::pipeline::processing::transcript::{content_fingerprint, replace_suffix};

/// A borrowed cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Int(u64),
    Text(&'a str),
}

impl FieldValue<'_> {
    fn render(&self) -> String {
        match self {
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Text(s) => (*s).to_string(),
        }
    }
}

/// Anything a [`Schema`] can validate.
pub trait Row {
    fn row_id(&self) -> u64;
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

/// How a derived field is computed from its source field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Derivation {
    /// Swap a trailing extension, e.g. `.mp4` → `.mp3`
    ReplaceSuffix { from: String, to: String },
    /// Parse WebVTT and collapse consecutive repeated captions
    CollapseCaptions,
    /// Content fingerprint of the text
    Fingerprint,
}

impl Derivation {
    pub fn apply(&self, source: &str) -> Option<String> {
        match self {
            Derivation::ReplaceSuffix { from, to } => replace_suffix(source, from, to),
            Derivation::CollapseCaptions => Some(captions::caption_text_to_transcript(source)),
            Derivation::Fingerprint => Some(content_fingerprint(source).to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub unique: bool,
    pub min_len: Option<usize>,
    pub min_value: Option<u64>,
    pub pattern: Option<Regex>,
    pub derived_from: Option<(&'static str, Derivation)>,
}

impl FieldRule {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            unique: false,
            min_len: None,
            min_value: None,
            pattern: None,
            derived_from: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn min_len(mut self, min_len: usize) -> Self {
        self.min_len = Some(min_len);
        self
    }

    pub fn min_value(mut self, min_value: u64) -> Self {
        self.min_value = Some(min_value);
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn derived_from(mut self, source: &'static str, derivation: Derivation) -> Self {
        self.derived_from = Some((source, derivation));
        self
    }
}

/// Compiled inputs the schemas are built from.
#[derive(Debug, Clone)]
pub struct SchemaSettings {
    pub canonical_pattern: Regex,
    pub media_pattern: Regex,
    pub audio_pattern: Regex,
    pub caption_pattern: Regex,
    pub media_extension: String,
    pub audio_extension: String,
    pub caption_extension: String,
    pub min_text_chars: usize,
}

impl SchemaSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            canonical_pattern: Regex::new(&config.patterns.canonical)?,
            media_pattern: Regex::new(&config.patterns.media)?,
            audio_pattern: Regex::new(&config.patterns.audio)?,
            caption_pattern: Regex::new(&config.patterns.caption)?,
            media_extension: config.media.media.clone(),
            audio_extension: config.media.audio.clone(),
            caption_extension: config.media.caption.clone(),
            min_text_chars: config.validation.min_text_chars,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub name: &'static str,
    pub fields: Vec<FieldRule>,
}

impl Schema {
    /// id, section, title, preacher, canonical_link
    pub fn pre_scraping(settings: &SchemaSettings) -> Self {
        Self {
            name: constants::STAGE_PRE_SCRAPING,
            fields: Self::base_fields(settings),
        }
    }

    /// The base shape plus media links, caption and transcript text, and fingerprint.
    pub fn transcript(settings: &SchemaSettings) -> Self {
        let mut fields = Self::base_fields(settings);
        fields.extend([
            FieldRule::new("media_link").unique().pattern(settings.media_pattern.clone()),
            FieldRule::new("audio_link")
                .unique()
                .pattern(settings.audio_pattern.clone())
                .derived_from(
                    "media_link",
                    Derivation::ReplaceSuffix {
                        from: settings.media_extension.clone(),
                        to: settings.audio_extension.clone(),
                    },
                ),
            FieldRule::new("caption_link")
                .unique()
                .pattern(settings.caption_pattern.clone())
                .derived_from(
                    "media_link",
                    Derivation::ReplaceSuffix {
                        from: settings.media_extension.clone(),
                        to: settings.caption_extension.clone(),
                    },
                ),
            FieldRule::new("caption_text").unique().min_len(settings.min_text_chars),
            FieldRule::new("transcript_text")
                .unique()
                .min_len(settings.min_text_chars)
                .derived_from("caption_text", Derivation::CollapseCaptions),
            FieldRule::new("content_fingerprint")
                .unique()
                .derived_from("transcript_text", Derivation::Fingerprint),
        ]);
        Self {
            name: constants::STAGE_TRANSCRIPT,
            fields,
        }
    }

    /// The base shape plus the media link and one chunk of text.
    pub fn chunk(settings: &SchemaSettings) -> Self {
        let mut fields = Self::base_fields(settings);
        fields.extend([
            FieldRule::new("media_link").pattern(settings.media_pattern.clone()),
            FieldRule::new("chunk").min_len(constants::MIN_CHUNK_CHARS),
        ]);
        Self {
            name: constants::STAGE_CHUNK,
            fields,
        }
    }

    fn base_fields(settings: &SchemaSettings) -> Vec<FieldRule> {
        vec![
            FieldRule::new("id").unique().min_value(1),
            FieldRule::new("section").min_len(constants::MIN_LABEL_CHARS),
            FieldRule::new("title").min_len(constants::MIN_LABEL_CHARS),
            FieldRule::new("preacher").min_len(constants::MIN_LABEL_CHARS),
            FieldRule::new("canonical_link")
                .unique()
                .pattern(settings.canonical_pattern.clone()),
        ]
    }

    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check every rule against every row. Never mutates the rows.
    pub fn validate<R: Row>(&self, rows: &[R]) -> Vec<Violation> {
        let mut violations = Vec::new();
        for rule in &self.fields {
            let mut first_seen: HashMap<String, usize> = HashMap::new();
            for (index, row) in rows.iter().enumerate() {
                let Some(value) = row.field(rule.name) else {
                    violations.push(self.violation(
                        index,
                        row,
                        rule,
                        ViolationKind::Missing,
                        format!("field '{}' is missing", rule.name),
                    ));
                    continue;
                };
                self.check_value(index, row, rule, value, &mut violations);
                if rule.unique {
                    let key = value.render();
                    if let Some(first) = first_seen.get(&key) {
                        violations.push(self.violation(
                            index,
                            row,
                            rule,
                            ViolationKind::Duplicate,
                            format!("duplicate '{}' (first seen in row {})", rule.name, first),
                        ));
                    } else {
                        first_seen.insert(key, index);
                    }
                }
            }
        }
        violations
    }

    fn check_value<R: Row>(
        &self,
        index: usize,
        row: &R,
        rule: &FieldRule,
        value: FieldValue<'_>,
        violations: &mut Vec<Violation>,
    ) {
        match value {
            FieldValue::Int(v) => {
                if let Some(min) = rule.min_value {
                    if v < min {
                        violations.push(self.violation(
                            index,
                            row,
                            rule,
                            ViolationKind::BelowMinimum,
                            format!("'{}' is {} but must be at least {}", rule.name, v, min),
                        ));
                    }
                }
            }
            FieldValue::Text(text) => {
                if let Some(min) = rule.min_len {
                    let len = text.chars().count();
                    if len < min {
                        violations.push(self.violation(
                            index,
                            row,
                            rule,
                            ViolationKind::TooShort,
                            format!("'{}' has {} chars, minimum is {}", rule.name, len, min),
                        ));
                    }
                }
                if let Some(pattern) = &rule.pattern {
                    if !full_match(pattern, text) {
                        violations.push(self.violation(
                            index,
                            row,
                            rule,
                            ViolationKind::PatternMismatch,
                            format!("'{}' value '{}' does not match {}", rule.name, text, pattern.as_str()),
                        ));
                    }
                }
            }
        }

        if let Some((source, derivation)) = &rule.derived_from {
            let expected = match row.field(source) {
                Some(FieldValue::Text(s)) => derivation.apply(s),
                Some(FieldValue::Int(v)) => derivation.apply(&v.to_string()),
                None => None,
            };
            if expected.as_deref() != Some(value.render().as_str()) {
                violations.push(self.violation(
                    index,
                    row,
                    rule,
                    ViolationKind::DerivationMismatch,
                    format!("'{}' is not derived from '{}'", rule.name, source),
                ));
            }
        }
    }

    fn violation<R: Row>(
        &self,
        index: usize,
        row: &R,
        rule: &FieldRule,
        kind: ViolationKind,
        message: String,
    ) -> Violation {
        Violation {
            stage: self.name.to_string(),
            row: Some(index),
            id: Some(row.row_id()),
            field: Some(rule.name.to_string()),
            kind,
            severity: Severity::Error,
            message,
        }
    }
}

/// True when the pattern matches the whole text, anchored or not.
pub fn full_match(pattern: &Regex, text: &str) -> bool {
    pattern
        .find(text)
        .map_or(false, |m| m.start() == 0 && m.end() == text.len())
}

impl Row for PreScrapingRecord {
    fn row_id(&self) -> u64 {
        self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "id" => Some(FieldValue::Int(self.id)),
            "section" => Some(FieldValue::Text(&self.section)),
            "title" => Some(FieldValue::Text(&self.title)),
            "preacher" => Some(FieldValue::Text(&self.preacher)),
            "canonical_link" => Some(FieldValue::Text(&self.canonical_link)),
            _ => None,
        }
    }
}

impl Row for TranscriptRecord {
    fn row_id(&self) -> u64 {
        self.record.id
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "media_link" => Some(FieldValue::Text(&self.media_link)),
            "audio_link" => Some(FieldValue::Text(&self.audio_link)),
            "caption_link" => Some(FieldValue::Text(&self.caption_link)),
            "caption_text" => Some(FieldValue::Text(&self.caption_text)),
            "transcript_text" => Some(FieldValue::Text(&self.transcript_text)),
            "content_fingerprint" => Some(FieldValue::Int(self.content_fingerprint)),
            other => self.record.field(other),
        }
    }
}

impl Row for ChunkRecord {
    fn row_id(&self) -> u64 {
        self.record.id
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "media_link" => Some(FieldValue::Text(&self.media_link)),
            "chunk" => Some(FieldValue::Text(&self.chunk)),
            other => self.record.field(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn settings(min_text_chars: usize) -> SchemaSettings {
        let mut config = Config::from_toml_str(
            "disallowed_sections = []\n[section_preachers]\n\"sermons\" = \"evaluate\"\n",
        )
        .unwrap();
        config.validation.min_text_chars = min_text_chars;
        SchemaSettings::from_config(&config).unwrap()
    }

    fn record(id: u64) -> PreScrapingRecord {
        PreScrapingRecord {
            id,
            section: "sermons pastor anderson".to_string(),
            title: "the gospel".to_string(),
            preacher: "pastor steven anderson".to_string(),
            canonical_link: format!("https://allthepreaching.com/pages/video.php?id={}", id),
        }
    }

    fn transcript(id: u64, text: &str) -> TranscriptRecord {
        let media_link = format!("https://cdn.example.com/videos/{}.mp4", id);
        let caption_text = format!("WEBVTT\n\n00:00:00.000 --> 00:00:02.000\n{}\n", text);
        let transcript_text = captions::caption_text_to_transcript(&caption_text);
        TranscriptRecord {
            record: record(id),
            audio_link: media_link.replace(".mp4", ".mp3"),
            caption_link: media_link.replace(".mp4", ".vtt"),
            media_link,
            content_fingerprint: content_fingerprint(&transcript_text),
            caption_text,
            transcript_text,
        }
    }

    #[test]
    fn test_clean_table_has_no_violations() {
        let schema = Schema::pre_scraping(&settings(5));
        let rows = vec![record(1), record(2)];
        assert!(schema.validate(&rows).is_empty());
    }

    #[test]
    fn test_reports_every_violation_in_one_pass() {
        let schema = Schema::pre_scraping(&settings(5));
        let mut bad = record(7);
        bad.title = "ab".to_string();
        bad.canonical_link = "/pages/video.php?id=7".to_string();
        let rows = vec![record(7), bad, record(0)];

        let violations = schema.validate(&rows);
        let kinds: Vec<_> = violations.iter().map(|v| (v.row, v.kind.clone())).collect();

        assert!(kinds.contains(&(Some(1), ViolationKind::TooShort)));
        assert!(kinds.contains(&(Some(1), ViolationKind::PatternMismatch)));
        assert!(kinds.contains(&(Some(1), ViolationKind::Duplicate)));
        assert!(kinds.contains(&(Some(2), ViolationKind::BelowMinimum)));
    }

    #[test]
    fn test_transcript_schema_accepts_assembled_rows() {
        let schema = Schema::transcript(&settings(5));
        let rows = vec![
            transcript(1, "and he said unto them go ye into all the world"),
            transcript(2, "blessed are the poor in spirit"),
        ];
        let violations = schema.validate(&rows);
        assert!(violations.is_empty(), "unexpected violations: {:?}", violations);
    }

    #[test]
    fn test_derivation_mismatch_is_reported() {
        let schema = Schema::transcript(&settings(5));
        let mut row = transcript(3, "repent and believe the gospel");
        row.audio_link = "https://cdn.example.com/videos/other.mp3".to_string();
        row.content_fingerprint = 42;

        let violations = schema.validate(&[row]);
        let fields: Vec<_> = violations
            .iter()
            .filter(|v| v.kind == ViolationKind::DerivationMismatch)
            .filter_map(|v| v.field.clone())
            .collect();
        assert_eq!(fields, vec!["audio_link", "content_fingerprint"]);
    }

    #[test]
    fn test_transcript_min_length_uses_configured_threshold() {
        let schema = Schema::transcript(&settings(50));
        let violations = schema.validate(&[transcript(4, "too short")]);
        assert!(violations
            .iter()
            .any(|v| v.field.as_deref() == Some("transcript_text") && v.kind == ViolationKind::TooShort));
    }

    #[test]
    fn test_chunk_schema_checks_chunk_length() {
        let schema = Schema::chunk(&settings(5));
        let chunk = ChunkRecord {
            record: record(9),
            media_link: "https://cdn.example.com/videos/9.mp4".to_string(),
            chunk: "amen".to_string(),
        };
        let violations = schema.validate(&[chunk]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field.as_deref(), Some("chunk"));
    }

    #[test]
    fn test_full_match_rejects_partial_matches() {
        let pattern = Regex::new(r"id=\d+").unwrap();
        assert!(full_match(&pattern, "id=12"));
        assert!(!full_match(&pattern, "video.php?id=12"));
    }
}
