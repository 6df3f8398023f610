//! User configuration (`config.json`).
//!
//! Missing or unreadable configuration never fails a hook: it falls back to
//! defaults, and a corrupt file is reported at warn level.

use std::collections::HashMap;
use std::time::Duration;

use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::atomic::write_json_atomic;
use crate::error::{HelperError, Result};
use crate::storage::StorageConfig;
use crate::types::SessionStatus;

/// Where multiple-choice questions get answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElicitationMode {
    /// In the driver's own terminal UI.
    #[default]
    Terminal,
    /// Through the aggregator's menu.
    Menubar,
}

impl std::str::FromStr for ElicitationMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "terminal" => Ok(ElicitationMode::Terminal),
            "menubar" => Ok(ElicitationMode::Menubar),
            other => Err(format!("unknown elicitation mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub elicitation_mode: ElicitationMode,
    pub request_timeout_secs: u64,
    pub request_poll_interval_ms: u64,
    pub poll_interval_secs: u64,
    pub stale_session_secs: i64,
    /// Status name → display glyph overrides.
    pub status_icons: HashMap<String, String>,
}

impl Default for HelperConfig {
    fn default() -> Self {
        HelperConfig {
            elicitation_mode: ElicitationMode::Terminal,
            request_timeout_secs: 300,
            request_poll_interval_ms: 500,
            poll_interval_secs: 2,
            stale_session_secs: 86_400,
            status_icons: HashMap::new(),
        }
    }
}

impl HelperConfig {
    /// Loads `config.json`, returning defaults if it is missing or corrupt.
    pub fn load(storage: &StorageConfig) -> HelperConfig {
        let path = storage.config_file();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return HelperConfig::default()
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read config, using defaults");
                return HelperConfig::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %path.display(),
                    "Malformed config, using defaults"
                );
                HelperConfig::default()
            }
        }
    }

    pub fn save(&self, storage: &StorageConfig) -> Result<()> {
        fs::create_dir_all(storage.root())
            .map_err(|e| HelperError::io("create storage root", e))?;
        write_json_atomic(&storage.config_file(), self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_poll_interval(&self) -> Duration {
        Duration::from_millis(self.request_poll_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Display glyph for a status, honoring user overrides.
    pub fn icon_for(&self, status: SessionStatus) -> &str {
        if let Some(icon) = self.status_icons.get(status.as_str()) {
            return icon;
        }
        match status {
            SessionStatus::Working => "\u{231b}",
            SessionStatus::Question => "\u{1F535}",
            SessionStatus::Permission => "\u{1F534}",
            SessionStatus::Done | SessionStatus::Idle => "\u{1F7E1}",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        assert_eq!(HelperConfig::load(&storage), HelperConfig::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        fs::write(storage.config_file(), "{not json").unwrap();
        assert_eq!(HelperConfig::load(&storage), HelperConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        fs::write(storage.config_file(), r#"{"elicitation_mode":"menubar"}"#).unwrap();

        let config = HelperConfig::load(&storage);
        assert_eq!(config.elicitation_mode, ElicitationMode::Menubar);
        assert_eq!(config.request_timeout_secs, 300);
    }

    #[test]
    fn save_then_load() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("nested"));
        let config = HelperConfig {
            elicitation_mode: ElicitationMode::Menubar,
            request_timeout_secs: 5,
            ..HelperConfig::default()
        };
        config.save(&storage).unwrap();
        assert_eq!(HelperConfig::load(&storage), config);
    }

    #[test]
    fn icon_overrides_fall_back_to_defaults() {
        let mut config = HelperConfig::default();
        config
            .status_icons
            .insert("working".to_string(), "*".to_string());
        assert_eq!(config.icon_for(SessionStatus::Working), "*");
        assert_eq!(config.icon_for(SessionStatus::Permission), "\u{1F534}");
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!(
            "menubar".parse::<ElicitationMode>(),
            Ok(ElicitationMode::Menubar)
        );
        assert!("tray".parse::<ElicitationMode>().is_err());
    }
}
