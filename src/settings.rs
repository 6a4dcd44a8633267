use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_FILE: &str = "teaching-stats.json";

/// On-disk settings file:
///
/// ```json
/// { "teachingStats": { "database": "teaching-stats.sqlite3" } }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    teaching_stats: Option<TeachingStatsSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeachingStatsSettings {
    pub database: PathBuf,
}

pub fn load(path: &Path) -> Result<TeachingStatsSettings> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path.display(), e)))?;
    let file: SettingsFile = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Configuration(format!("cannot parse {}: {}", path.display(), e)))?;
    file.teaching_stats
        .ok_or_else(|| Error::Configuration("missing 'teachingStats' section".into()))
}
