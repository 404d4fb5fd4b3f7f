/// Persisted application settings
///
/// Camera preferences survive restarts as a small JSON file in the
/// user's data directory.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::camera::device::CameraPosition;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AppSettings {
    /// Which camera to bind at startup
    pub camera_position: CameraPosition,
    /// Whether the flash toggle was left on
    pub flash_on: bool,
    /// Last zoom factor, clamped again against the device at apply time
    pub zoom_factor: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            camera_position: CameraPosition::Back,
            flash_on: false,
            zoom_factor: 1.0,
        }
    }
}

impl AppSettings {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Default settings file location, next to the cutout database.
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::data_dir().or_else(dirs::home_dir)?;
        path.push("wardrobe-studio");
        path.push("settings.json");
        Some(path)
    }

    /// Load settings, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Settings file is malformed, using defaults: {e}");
                    AppSettings::default()
                }
            },
            Err(_) => AppSettings::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {e}"))?;
        }
        let json = self
            .to_json()
            .map_err(|e| format!("Failed to serialize settings: {e}"))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let settings = AppSettings {
            camera_position: CameraPosition::Front,
            flash_on: true,
            zoom_factor: 2.5,
        };

        let json = settings.to_json().unwrap();
        let restored = AppSettings::from_json(&json).unwrap();
        assert_eq!(settings, restored);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir()
            .join("wardrobe-studio-tests")
            .join(format!("settings-{}.json", uuid::Uuid::new_v4()));

        assert_eq!(AppSettings::load_or_default(&path), AppSettings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir()
            .join("wardrobe-studio-tests")
            .join(format!("settings-{}.json", uuid::Uuid::new_v4()));

        let settings = AppSettings {
            camera_position: CameraPosition::Front,
            flash_on: false,
            zoom_factor: 3.0,
        };
        settings.save(&path).unwrap();

        assert_eq!(AppSettings::load_or_default(&path), settings);
        let _ = std::fs::remove_file(path);
    }
}
