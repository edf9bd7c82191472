use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::constants;
use crate::error::{Result, ScraperError};

/// Static pipeline configuration, loaded once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_archive_url")]
    pub archive_url: String,
    pub disallowed_sections: Vec<String>,
    /// Applied in declared order, each one globally
    #[serde(default)]
    pub section_rewrites: Vec<RewriteRule>,
    #[serde(default)]
    pub title_rewrites: Vec<RewriteRule>,
    /// Section name → preacher name, or `"evaluate"`
    pub section_preachers: BTreeMap<String, String>,
    /// First fragment found in the title wins
    #[serde(default)]
    pub preacher_fragments: Vec<PreacherFragment>,
    #[serde(default)]
    pub known_ids: Vec<u64>,
    #[serde(default)]
    pub patterns: LinkPatterns,
    #[serde(default)]
    pub media: MediaExtensions,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRule {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreacherFragment {
    pub fragment: String,
    pub preacher: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkPatterns {
    pub canonical: String,
    pub media: String,
    pub audio: String,
    pub caption: String,
}

impl Default for LinkPatterns {
    fn default() -> Self {
        Self {
            canonical: constants::CANONICAL_LINK_PATTERN.to_string(),
            media: constants::MEDIA_LINK_PATTERN.to_string(),
            audio: constants::AUDIO_LINK_PATTERN.to_string(),
            caption: constants::CAPTION_LINK_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaExtensions {
    pub media: String,
    pub audio: String,
    pub caption: String,
}

impl Default for MediaExtensions {
    fn default() -> Self {
        Self {
            media: constants::MEDIA_EXTENSION.to_string(),
            audio: constants::AUDIO_EXTENSION.to_string(),
            caption: constants::CAPTION_EXTENSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum length of caption and transcript text
    pub min_text_chars: usize,
    /// Abort the run on the first stage that reports violations
    pub fail_fast: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_text_chars: constants::DEFAULT_MIN_TEXT_CHARS,
            fail_fast: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub concurrency: u32,
    pub requests_per_min: u64,
    pub timeout_secs: u64,
    /// Only fetch media for the first N records
    pub limit: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            requests_per_min: 60,
            timeout_secs: 30,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
    /// SQLite file holding already-processed ids, relative to `dir` unless absolute
    pub state_db: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: constants::DEFAULT_OUTPUT_DIR.to_string(),
            state_db: constants::STATE_DB_FILE.to_string(),
        }
    }
}

fn default_base_url() -> String {
    constants::DEFAULT_BASE_URL.to_string()
}

fn default_archive_url() -> String {
    constants::DEFAULT_ARCHIVE_URL.to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that serde cannot express. Regexes are compiled by the stages.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ScraperError::Config("base_url must not be empty".into()));
        }
        if self.section_preachers.is_empty() {
            return Err(ScraperError::Config("section_preachers must map at least one section".into()));
        }
        if let Some((section, _)) = self.section_preachers.iter().find(|(_, p)| p.trim().is_empty()) {
            return Err(ScraperError::Config(format!("section '{}' maps to an empty preacher", section)));
        }
        if let Some(f) = self.preacher_fragments.iter().find(|f| f.fragment.is_empty()) {
            return Err(ScraperError::Config(format!(
                "empty name fragment for preacher '{}'",
                f.preacher
            )));
        }
        if let Some(f) = self.preacher_fragments.iter().find(|f| f.preacher.trim().is_empty()) {
            return Err(ScraperError::Config(format!(
                "name fragment '{}' maps to an empty preacher",
                f.fragment
            )));
        }
        if self.fetch.concurrency == 0 {
            return Err(ScraperError::Config("fetch.concurrency must be at least 1".into()));
        }
        for ext in [&self.media.media, &self.media.audio, &self.media.caption] {
            if ext.is_empty() {
                return Err(ScraperError::Config("media extensions must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        Path::new(&self.output.dir)
    }

    pub fn state_db_path(&self) -> std::path::PathBuf {
        let state = Path::new(&self.output.state_db);
        if state.is_absolute() {
            state.to_path_buf()
        } else {
            self.output_dir().join(state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        disallowed_sections = ["music"]

        [section_preachers]
        "sermons pastor anderson" = "pastor steven anderson"
    "#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.base_url, constants::DEFAULT_BASE_URL);
        assert_eq!(config.validation.min_text_chars, constants::DEFAULT_MIN_TEXT_CHARS);
        assert!(!config.validation.fail_fast);
        assert_eq!(config.media.audio, ".mp3");
        assert!(config.known_ids.is_empty());
    }

    #[test]
    fn test_missing_required_key_is_an_error() {
        let result = Config::from_toml_str(r#"disallowed_sections = ["music"]"#);
        assert!(matches!(result, Err(ScraperError::Toml(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let toml = format!("{}\n[fetch]\nconcurrency = 0\nrequests_per_min = 10\ntimeout_secs = 5\n", MINIMAL);
        let result = Config::from_toml_str(&toml);
        assert!(matches!(result, Err(ScraperError::Config(_))));
    }

    #[test]
    fn test_fragment_with_blank_preacher_rejected() {
        let toml = format!(
            "{}\n[[preacher_fragments]]\nfragment = \"jimenez\"\npreacher = \"  \"\n",
            MINIMAL
        );
        let result = Config::from_toml_str(&toml);
        assert!(matches!(result, Err(ScraperError::Config(ref m)) if m.contains("jimenez")));
    }

    #[test]
    fn test_rewrite_order_is_preserved() {
        let toml = format!(
            "{}\n[[section_rewrites]]\npattern = \"a\"\nreplacement = \"b\"\n\n[[section_rewrites]]\npattern = \"b\"\nreplacement = \"c\"\n",
            MINIMAL
        );
        let config = Config::from_toml_str(&toml).unwrap();
        let patterns: Vec<_> = config.section_rewrites.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["a", "b"]);
    }

    #[test]
    fn test_state_db_resolves_under_output_dir() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.state_db_path(), Path::new("output").join("state.db"));
    }
}
