//! User settings persisted as JSON in the platform config directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::DEFAULT_BACKEND_URL;
use crate::conditioner::{LiveConditioning, ReferenceConditioning};
use crate::error::Result;
use crate::pitch::ExtractorConfig;

const APP_DIR: &str = "cantor";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Playback speed factor for both players.
    pub playback_speed: f32,
    pub backend_url: String,
    pub extractor: ExtractorConfig,
    pub live_conditioning: LiveConditioning,
    pub reference_conditioning: ReferenceConditioning,
    /// Frequency band used by the full-screen graph, `(min_hz, max_hz)`.
    pub fixed_frequency_band: (f32, f32),
    /// Connect curves across unvoiced gaps.
    pub bridge_gaps: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            playback_speed: 1.0,
            backend_url: DEFAULT_BACKEND_URL.to_owned(),
            extractor: ExtractorConfig::default(),
            live_conditioning: LiveConditioning::default(),
            reference_conditioning: ReferenceConditioning::default(),
            fixed_frequency_band: (60.0, 600.0),
            bridge_gaps: false,
        }
    }
}

/// `<config dir>/cantor`, or the working directory when there is none.
pub fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Settings {
    pub fn path() -> PathBuf {
        app_dir().join(SETTINGS_FILE)
    }

    /// Loads from the default location. Any failure gives the defaults.
    pub fn load() -> Self {
        let path = Self::path();
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(err) => {
                if path.exists() {
                    log::warn!("Could not read settings from {}: {err}", path.display());
                }
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::debug!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let settings = Settings {
            playback_speed: 0.75,
            bridge_gaps: true,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{"playback_speed": 1.5}"#).unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.playback_speed, 1.5);
        assert_eq!(settings.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(settings.live_conditioning, LiveConditioning::default());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}
