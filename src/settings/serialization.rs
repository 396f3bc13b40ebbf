// Settings serialization
// RON document with a format version and a modification timestamp

use super::SettingsError;
use super::types::MetronomeSettings;
use chrono::{DateTime, Utc};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current settings file format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// File name inside the settings directory
pub const SETTINGS_FILE_NAME: &str = "settings.ron";

/// On-disk settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsFile {
    pub version: u32,
    pub modified_at: DateTime<Utc>,
    pub settings: MetronomeSettings,
}

impl SettingsFile {
    pub fn new(settings: MetronomeSettings) -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            modified_at: Utc::now(),
            settings,
        }
    }
}

/// Serialize settings to a RON string
pub fn serialize_to_ron(settings: &MetronomeSettings) -> Result<String, SettingsError> {
    let file = SettingsFile::new(settings.clone());
    let ron = ron::ser::to_string_pretty(&file, PrettyConfig::default())?;
    Ok(ron)
}

/// Deserialize settings from a RON string
///
/// Out-of-range values are clamped rather than rejected so that a hand-edited
/// file never locks the user out.
pub fn deserialize_from_ron(data: &str) -> Result<MetronomeSettings, SettingsError> {
    let file: SettingsFile = ron::from_str(data)?;

    if file.version != SETTINGS_FORMAT_VERSION {
        return Err(SettingsError::UnsupportedVersion(file.version));
    }

    let mut settings = file.settings;
    if settings.sanitize() {
        log::warn!("Stored settings were out of range and have been clamped");
    }
    Ok(settings)
}

/// Read settings from disk; a missing file yields defaults
pub fn load_from_file(path: &Path) -> Result<MetronomeSettings, SettingsError> {
    if !path.exists() {
        log::info!(
            "No settings file at {}, using defaults",
            path.display()
        );
        return Ok(MetronomeSettings::default());
    }

    let data = std::fs::read_to_string(path)?;
    deserialize_from_ron(&data)
}

/// Write settings to disk, creating parent directories
///
/// The document is written to a sibling temp file and renamed into place.
pub fn save_to_file(path: &Path, settings: &MetronomeSettings) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let data = serialize_to_ron(settings)?;
    let temp_path = path.with_extension("ron.tmp");
    std::fs::write(&temp_path, data)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Platform settings location
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
    Ok(dir.join(env!("CARGO_PKG_NAME")).join(SETTINGS_FILE_NAME))
}
