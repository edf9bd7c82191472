use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, instrument};

use crate::config::{Config, RewriteRule};
use crate::constants;
use crate::domain::{PreScrapingRecord, RawRecord};
use crate::error::Result;
use crate::metrics as metric_names;
use crate::pipeline::processing::quality_gate::{Severity, Violation, ViolationKind};

/// A compiled `pattern → replacement` rule, applied to every match
#[derive(Debug, Clone)]
pub struct TextRewrite {
    pub pattern: Regex,
    pub replacement: String,
}

impl TextRewrite {
    pub fn compile(rule: &RewriteRule) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(&rule.pattern)?,
            replacement: rule.replacement.clone(),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }
}

/// Apply rewrites in declared order
pub fn apply_rewrites(rewrites: &[TextRewrite], text: &str) -> String {
    rewrites
        .iter()
        .fold(text.to_string(), |acc, rewrite| rewrite.apply(&acc))
}

#[derive(Debug, Clone)]
pub struct NormalizerSettings {
    pub disallowed_sections: HashSet<String>,
    pub section_rewrites: Vec<TextRewrite>,
    pub title_rewrites: Vec<TextRewrite>,
    pub section_preachers: HashMap<String, String>,
    pub base_url: String,
    pub id_pattern: Regex,
}

impl NormalizerSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            disallowed_sections: config
                .disallowed_sections
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect(),
            section_rewrites: config
                .section_rewrites
                .iter()
                .map(TextRewrite::compile)
                .collect::<Result<_>>()?,
            title_rewrites: config
                .title_rewrites
                .iter()
                .map(TextRewrite::compile)
                .collect::<Result<_>>()?,
            section_preachers: config
                .section_preachers
                .iter()
                .map(|(section, preacher)| (section.trim().to_lowercase(), preacher.clone()))
                .collect(),
            base_url: config.base_url.trim_end_matches('?').to_string(),
            id_pattern: Regex::new(constants::ID_PATTERN)?,
        })
    }
}

/// Why records left the normalizer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub input: usize,
    pub disallowed: usize,
    pub missing_id: usize,
    pub duplicate_id: usize,
    pub known_id: usize,
    pub unmapped_section: usize,
    pub output: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizationOutcome {
    pub records: Vec<PreScrapingRecord>,
    pub stats: NormalizationStats,
    /// Rewritten section name → number of records dropped for lack of a preacher mapping
    pub unmapped_sections: BTreeMap<String, usize>,
}

impl NormalizationOutcome {
    /// One warning per unmapped section, so silent join losses show up in the report
    pub fn unmapped_violations(&self) -> Vec<Violation> {
        self.unmapped_sections
            .iter()
            .map(|(section, count)| Violation {
                stage: constants::STAGE_PRE_SCRAPING.to_string(),
                row: None,
                id: None,
                field: Some("section".to_string()),
                kind: ViolationKind::UnmappedSection,
                severity: Severity::Warning,
                message: format!(
                    "section '{}' has no preacher mapping; {} record(s) dropped",
                    section, count
                ),
            })
            .collect()
    }
}

/// Turns raw archive entries into the canonical pre-scraping table
pub struct RecordNormalizer {
    settings: NormalizerSettings,
}

impl RecordNormalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(NormalizerSettings::from_config(config)?))
    }

    /// `base_url?id=<id>`
    pub fn canonical_link(&self, id: u64) -> String {
        format!("{}?id={}", self.settings.base_url, id)
    }

    /// The positive integer behind `id=` in a scraped link
    pub fn extract_id(&self, raw_link: &str) -> Option<u64> {
        self.settings
            .id_pattern
            .captures(raw_link)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .filter(|id| *id >= 1)
    }

    /// Normalize in input order. Every emitted id is added to `known_ids`, so a second
    /// pass over the same input emits nothing.
    #[instrument(skip(self, raw, known_ids), fields(input = raw.len(), known = known_ids.len()))]
    pub fn normalize(&self, raw: &[RawRecord], known_ids: &mut HashSet<u64>) -> NormalizationOutcome {
        let mut outcome = NormalizationOutcome::default();
        outcome.stats.input = raw.len();
        let mut seen_in_batch = HashSet::new();

        for record in raw {
            let raw_section = record.section.trim().to_lowercase();
            if self.settings.disallowed_sections.contains(&raw_section) {
                outcome.stats.disallowed += 1;
                continue;
            }

            let section = apply_rewrites(&self.settings.section_rewrites, &raw_section);
            let title = apply_rewrites(&self.settings.title_rewrites, &record.title.trim().to_lowercase());

            let Some(id) = self.extract_id(&record.raw_link) else {
                debug!("No id in link '{}'", record.raw_link);
                outcome.stats.missing_id += 1;
                continue;
            };
            if !seen_in_batch.insert(id) {
                outcome.stats.duplicate_id += 1;
                continue;
            }
            if known_ids.contains(&id) {
                outcome.stats.known_id += 1;
                continue;
            }

            let Some(preacher) = self.settings.section_preachers.get(&section) else {
                *outcome.unmapped_sections.entry(section).or_insert(0) += 1;
                outcome.stats.unmapped_section += 1;
                continue;
            };

            known_ids.insert(id);
            outcome.records.push(PreScrapingRecord {
                id,
                section,
                title,
                preacher: preacher.clone(),
                canonical_link: self.canonical_link(id),
            });
        }

        outcome.stats.output = outcome.records.len();
        metrics::counter!(metric_names::RECORDS_NORMALIZED).increment(outcome.records.len() as u64);
        info!(
            "Normalized {} of {} raw records (disallowed {}, bad id {}, known {}, duplicate {}, unmapped {})",
            outcome.stats.output,
            outcome.stats.input,
            outcome.stats.disallowed,
            outcome.stats.missing_id,
            outcome.stats.known_id,
            outcome.stats.duplicate_id,
            outcome.stats.unmapped_section
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        disallowed_sections = ["music"]

        [[section_rewrites]]
        pattern = "sermonsp"
        replacement = "sermons p"

        [[section_rewrites]]
        pattern = "sermons pastor"
        replacement = "sermons by pastor"

        [[title_rewrites]]
        pattern = "\\s+"
        replacement = " "

        [section_preachers]
        "sermons by pastor anderson" = "pastor steven anderson"
        "soulwinning marathon" = "evaluate"
    "#;

    fn normalizer() -> RecordNormalizer {
        RecordNormalizer::from_config(&Config::from_toml_str(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn test_normalize_builds_canonical_records() {
        let raw = vec![RawRecord::new("SermonsPastor Anderson", "The   Gospel", "video.php?id=42&x=1")];
        let outcome = normalizer().normalize(&raw, &mut HashSet::new());

        assert_eq!(
            outcome.records,
            vec![PreScrapingRecord {
                id: 42,
                section: "sermons by pastor anderson".to_string(),
                title: "the gospel".to_string(),
                preacher: "pastor steven anderson".to_string(),
                canonical_link: "https://allthepreaching.com/pages/video.php?id=42".to_string(),
            }]
        );
    }

    #[test]
    fn test_disallowed_section_never_appears() {
        let raw = vec![
            RawRecord::new("music", "hymn", "video.php?id=1"),
            RawRecord::new("soulwinning marathon", "pastor mejia", "video.php?id=2"),
        ];
        let outcome = normalizer().normalize(&raw, &mut HashSet::new());
        assert_eq!(outcome.stats.disallowed, 1);
        assert!(outcome.records.iter().all(|r| r.section != "music"));
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].preacher, "evaluate");
    }

    #[test]
    fn test_bad_and_duplicate_ids_are_filtered() {
        let raw = vec![
            RawRecord::new("soulwinning marathon", "first", "video.php?id=5"),
            RawRecord::new("soulwinning marathon", "again", "https://allthepreaching.com/pages/video.php?id=5"),
            RawRecord::new("soulwinning marathon", "no id", "video.php"),
            RawRecord::new("soulwinning marathon", "zero", "video.php?id=0"),
        ];
        let outcome = normalizer().normalize(&raw, &mut HashSet::new());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].title, "first");
        assert_eq!(outcome.stats.duplicate_id, 1);
        assert_eq!(outcome.stats.missing_id, 2);
    }

    #[test]
    fn test_unmapped_section_is_dropped_and_reported() {
        let raw = vec![
            RawRecord::new("documentaries", "after the tribulation", "video.php?id=8"),
            RawRecord::new("documentaries", "marching to zion", "video.php?id=9"),
        ];
        let outcome = normalizer().normalize(&raw, &mut HashSet::new());
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.unmapped_sections.get("documentaries"), Some(&2));

        let violations = outcome.unmapped_violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::UnmappedSection);
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    #[test]
    fn test_second_pass_is_empty() {
        let raw = vec![
            RawRecord::new("soulwinning marathon", "pastor mejia", "video.php?id=2"),
            RawRecord::new("sermonspastor anderson", "the gospel", "video.php?id=3"),
        ];
        let normalizer = normalizer();
        let mut known = HashSet::new();

        let first = normalizer.normalize(&raw, &mut known);
        assert_eq!(first.records.len(), 2);

        let second = normalizer.normalize(&raw, &mut known);
        assert!(second.records.is_empty());
        assert_eq!(second.stats.known_id, 2);
    }

    #[test]
    fn test_canonical_link_is_function_of_id() {
        let normalizer = normalizer();
        for id in [1u64, 77, 123456] {
            assert_eq!(
                normalizer.canonical_link(id),
                format!("https://allthepreaching.com/pages/video.php?id={}", id)
            );
        }
    }

    #[test]
    fn test_section_mapping_keys_match_case_insensitively() {
        let config = Config::from_toml_str(
            r#"
            disallowed_sections = []

            [section_preachers]
            " Conference " = "evaluate"
        "#,
        )
        .unwrap();
        let normalizer = RecordNormalizer::from_config(&config).unwrap();

        let raw = vec![RawRecord::new("conference", "first day", "video.php?id=11")];
        let outcome = normalizer.normalize(&raw, &mut HashSet::new());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].preacher, "evaluate");
        assert_eq!(outcome.stats.unmapped_section, 0);
    }

    #[test]
    fn test_rewrites_apply_in_order_and_globally() {
        let rewrites = vec![
            TextRewrite::compile(&RewriteRule { pattern: "a".into(), replacement: "b".into() }).unwrap(),
            TextRewrite::compile(&RewriteRule { pattern: "b".into(), replacement: "c".into() }).unwrap(),
        ];
        assert_eq!(apply_rewrites(&rewrites, "abab"), "cccc");
    }
}
