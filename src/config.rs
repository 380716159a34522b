use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "qrdrop";
const APP_NAME: &str = "qrdrop";
const SETTINGS_FILE: &str = "settings.json";

/// Settings the host application supplies to the share core: whether LAN
/// sharing is allowed at all, which port to bind, and the PIN guarding the
/// download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareSettings {
    pub enabled: bool,
    pub port: u32,
    pub pin: String,
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8000,
            pin: "1111".to_string(),
        }
    }
}

impl ShareSettings {
    /// Get the settings file path
    fn settings_path() -> Option<PathBuf> {
        if let Ok(test_path) = std::env::var("QRDROP_CONFIG_DIR") {
            return Some(PathBuf::from(test_path).join(SETTINGS_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Load settings from disk or return defaults
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        let path = match Self::settings_path() {
            Some(p) => p,
            None => return,
        };

        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = fs::write(path, json);
        }
    }
}
