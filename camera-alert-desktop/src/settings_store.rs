//! JSON settings file.
//!
//! The core treats settings as an in-memory document; this module owns the
//! on-disk copy at `{config_dir}/camera-alert/settings.json`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use camera_alert_core::Settings;

const APP_DIR: &str = "camera-alert";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write settings to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Default settings location. Falls back to the working directory when the
/// platform has no config directory.
pub fn default_settings_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(SETTINGS_FILE)
}

/// Read settings from `path`. A missing file yields the defaults; unknown
/// or missing fields are tolerated.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("No settings at {}, using defaults", path.display());
            return Ok(Settings::default());
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(serde_json::from_str(&json)?)
}

/// Write settings to `path`, creating parent directories as needed.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    let write_err = |source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json).map_err(write_err)?;
    log::debug!("Settings saved to {}", path.display());
    Ok(())
}
