//! Atomic record replacement: temp file in the destination directory, then rename.
//!
//! Readers either see the previous document or the new one, never a torn
//! write. If any step fails the previous document is left untouched.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{HelperError, Result};

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)
        .map_err(|e| HelperError::json(format!("serialize {}", path.display()), e))?;
    write_bytes_atomic(path, &content)
}

pub(crate) fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent_dir = path.parent().ok_or_else(|| {
        HelperError::io(
            format!("{} has no parent directory", path.display()),
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        )
    })?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .map_err(|e| HelperError::io(format!("create temp file in {}", parent_dir.display()), e))?;
    temp_file
        .write_all(content)
        .map_err(|e| HelperError::io(format!("write temp file for {}", path.display()), e))?;
    temp_file
        .flush()
        .map_err(|e| HelperError::io(format!("flush temp file for {}", path.display()), e))?;
    temp_file.persist(path).map_err(|e| HelperError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}
