//! Storage configuration and path management for Claude Helper.
//!
//! Every path the hook and the daemon touch is derived here, so tests can
//! point both at a temp directory with [`StorageConfig::with_root`].
//!
//! ```text
//! ~/.claude-helper/
//! ├── config.json
//! ├── status.json
//! ├── logs/hook.log
//! └── sessions/{session_id}/
//!     ├── info.json
//!     ├── pending/{item_id}.json
//!     └── responses/{item_id}.json
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{HelperError, Result};

/// Overrides the storage root (used by tests and side-by-side installs).
pub const HOME_ENV: &str = "CLAUDE_HELPER_HOME";

const ROOT_DIR_NAME: &str = ".claude-helper";

/// Central configuration for all Claude Helper storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the root from `CLAUDE_HELPER_HOME`, falling back to `~/.claude-helper`.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = env::var(HOME_ENV) {
            if !path.trim().is_empty() {
                return Ok(Self::with_root(PathBuf::from(path)));
            }
        }
        let home = dirs::home_dir().ok_or(HelperError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(ROOT_DIR_NAME)))
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Global Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to config.json (user preferences).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Path to status.json (last aggregate snapshot published by the daemon).
    pub fn status_file(&self) -> PathBuf {
        self.root.join("status.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Session Tree
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Callers must validate `session_id` before building paths from it.
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(session_id)
    }

    pub fn session_info_file(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("info.json")
    }

    pub fn pending_dir(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("pending")
    }

    pub fn pending_file(&self, session_id: &str, item_id: &str) -> PathBuf {
        self.pending_dir(session_id).join(format!("{}.json", item_id))
    }

    pub fn responses_dir(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("responses")
    }

    pub fn response_file(&self, session_id: &str, item_id: &str) -> PathBuf {
        self.responses_dir(session_id)
            .join(format!("{}.json", item_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_paths_nest_under_root() {
        let storage = StorageConfig::with_root(PathBuf::from("/tmp/helper"));
        assert_eq!(
            storage.session_info_file("s1"),
            PathBuf::from("/tmp/helper/sessions/s1/info.json")
        );
        assert_eq!(
            storage.pending_file("s1", "item"),
            PathBuf::from("/tmp/helper/sessions/s1/pending/item.json")
        );
        assert_eq!(
            storage.response_file("s1", "item"),
            PathBuf::from("/tmp/helper/sessions/s1/responses/item.json")
        );
    }

    #[test]
    fn global_files_live_at_root() {
        let storage = StorageConfig::with_root(PathBuf::from("/tmp/helper"));
        assert_eq!(
            storage.config_file(),
            PathBuf::from("/tmp/helper/config.json")
        );
        assert_eq!(
            storage.status_file(),
            PathBuf::from("/tmp/helper/status.json")
        );
        assert_eq!(storage.logs_dir(), PathBuf::from("/tmp/helper/logs"));
    }
}
