//! Error types for helper-core operations.

use std::path::PathBuf;

/// All errors that can occur in helper-core operations.
///
/// Benign protocol conditions (a session that vanished, a payload without a
/// session id) are not errors; handlers report them as no-op outcomes.
#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    // ─────────────────────────────────────────────────────────────────────
    // Addressing Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid {kind} id: {value:?}")]
    InvalidId { kind: &'static str, value: String },

    #[error("Session not found: {0}")]
    SessionMissing(String),

    #[error("Pending item not found: {session_id}/{item_id}")]
    ItemMissing { session_id: String, item_id: String },

    #[error("Pending item is no longer actionable: {item_id}: {reason}")]
    StaleItem { item_id: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HelperError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        HelperError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        HelperError::Json {
            context: context.into(),
            source,
        }
    }

    /// A file or directory disappeared under an I/O operation.
    pub(crate) fn is_not_found_io(&self) -> bool {
        match self {
            HelperError::Io { source, .. } | HelperError::Persist { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }

    /// True for errors that mean "the record this operation targeted is gone".
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            HelperError::SessionMissing(_) | HelperError::ItemMissing { .. }
        )
    }
}

/// Convenience type alias for Results using HelperError.
pub type Result<T> = std::result::Result<T, HelperError>;
