//! Values shared across stages. Config files may override the URL-shaped ones.

/// Marker in the section→preacher mapping meaning "infer the preacher from the title"
pub const EVALUATE_PREACHER: &str = "evaluate";

/// Preacher assigned when inference finds no known name fragment
pub const UNKNOWN_PREACHER: &str = "unknown";

pub const DEFAULT_BASE_URL: &str = "https://allthepreaching.com/pages/video.php";
pub const DEFAULT_ARCHIVE_URL: &str = "https://allthepreaching.com/pages/archive.php";

// Link patterns
pub const CANONICAL_LINK_PATTERN: &str = r"^https://allthepreaching.com/pages/video.php\?id=\d+$";
pub const MEDIA_LINK_PATTERN: &str =
    r"^(https?://)?(www\.)?[a-zA-Z0-9]+([\-\.][a-zA-Z0-9]+)*\.[a-zA-Z]{2,5}(:[0-9]{1,5})?(/.*)?mp4$";
pub const AUDIO_LINK_PATTERN: &str =
    r"^(https?://)?(www\.)?[a-zA-Z0-9]+([\-\.][a-zA-Z0-9]+)*\.[a-zA-Z]{2,5}(:[0-9]{1,5})?(/.*)?mp3$";
pub const CAPTION_LINK_PATTERN: &str =
    r"^(https?://)?(www\.)?[a-zA-Z0-9]+([\-\.][a-zA-Z0-9]+)*\.[a-zA-Z]{2,5}(:[0-9]{1,5})?(/.*)?vtt$";

pub const MEDIA_EXTENSION: &str = ".mp4";
pub const AUDIO_EXTENSION: &str = ".mp3";
pub const CAPTION_EXTENSION: &str = ".vtt";

/// Query-parameter pattern the record id is re-extracted with
pub const ID_PATTERN: &str = r"id=(\d+)";

/// Minimum length for section, title and preacher text
pub const MIN_LABEL_CHARS: usize = 3;
/// Minimum caption/transcript length. Shorter captions are almost always empty VTT files.
pub const DEFAULT_MIN_TEXT_CHARS: usize = 50;
/// Minimum chunk length for the downstream embedding stage
pub const MIN_CHUNK_CHARS: usize = 5;

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const STATE_DB_FILE: &str = "state.db";

// Stage names used in reports and logs
pub const STAGE_PRE_SCRAPING: &str = "pre_scraping";
pub const STAGE_TRANSCRIPT: &str = "transcript";
pub const STAGE_CHUNK: &str = "chunk";
