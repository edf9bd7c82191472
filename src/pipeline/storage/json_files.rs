use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// Write `value` as pretty JSON to `<output_dir>/<name>_<timestamp>.json`
pub fn persist_to_json<T: Serialize + ?Sized>(value: &T, name: &str, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let filepath = output_dir.join(format!("{name}_{timestamp}.json"));

    let json_content = serde_json::to_string_pretty(value)?;
    fs::write(&filepath, json_content)?;
    debug!("Wrote {}", filepath.display());

    Ok(filepath)
}

/// Load a table previously written by [`persist_to_json`]
pub fn read_json_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
