//! Directory-tree implementation of [`StateStore`].
//!
//! Many short-lived hook processes write here while the daemon scans. There is
//! no lock: every document is replaced whole through the atomic writer, and
//! conditional transitions re-read the record immediately before writing.
//!
//! # Defensive Reads
//!
//! - Missing files read as absent records.
//! - Corrupt session records surface as [`ScannedSession::Unreadable`] so the
//!   startup sweep can remove them.
//! - Corrupt pending items and responses are skipped (and logged) rather than
//!   failing a whole listing.
//! - Directory entries whose names are not safe identifiers are ignored.

use std::io::ErrorKind;
use std::path::Path;

use fs_err as fs;
use serde::de::DeserializeOwned;

use claude_helper_protocol::is_safe_id;

use crate::atomic::write_json_atomic;
use crate::error::{HelperError, Result};
use crate::storage::StorageConfig;

use super::store::{check_id, now_secs, ScannedSession, StateStore, UpdateOutcome};
use super::types::{PendingItem, ResponseRecord, SessionRecord};

pub struct FsStateStore {
    storage: StorageConfig,
}

impl FsStateStore {
    pub fn new(storage: StorageConfig) -> Self {
        FsStateStore { storage }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// True only for a real directory; a symlink in the session tree is never followed.
    fn session_exists(&self, session_id: &str) -> bool {
        fs::symlink_metadata(self.storage.session_dir(session_id))
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    fn require_session(&self, session_id: &str) -> Result<()> {
        if self.session_exists(session_id) {
            Ok(())
        } else {
            Err(HelperError::SessionMissing(session_id.to_string()))
        }
    }
}

impl StateStore for FsStateStore {
    fn create_session(&self, record: &SessionRecord) -> Result<()> {
        let session_id = record.session_id.as_str();
        check_id("session", session_id)?;

        create_private_dir(&self.storage.session_dir(session_id))?;
        write_json_atomic(&self.storage.session_info_file(session_id), record)?;

        tracing::debug!(session = %session_id, "Session record written");
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        check_id("session", session_id)?;
        if !self.session_exists(session_id) {
            return Ok(None);
        }
        read_json(&self.storage.session_info_file(session_id))
    }

    fn update_session(
        &self,
        session_id: &str,
        apply: &mut dyn FnMut(&mut SessionRecord) -> bool,
    ) -> Result<UpdateOutcome> {
        let Some(current) = self.load_session(session_id)? else {
            return Ok(UpdateOutcome::Missing);
        };

        let mut next = current.clone();
        if !apply(&mut next) {
            return Ok(UpdateOutcome::Unchanged(current));
        }
        next.stamp(now_secs());

        match write_json_atomic(&self.storage.session_info_file(session_id), &next) {
            Ok(()) => Ok(UpdateOutcome::Applied(next)),
            // Deleted between read and write: the temp file could not be placed.
            Err(err) if err.is_not_found_io() || !self.session_exists(session_id) => {
                Ok(UpdateOutcome::Missing)
            }
            Err(err) => Err(err),
        }
    }

    fn delete_session(&self, session_id: &str) -> Result<bool> {
        check_id("session", session_id)?;
        let dir = self.storage.session_dir(session_id);

        let meta = match fs::symlink_metadata(&dir) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(HelperError::io("stat session dir", err)),
        };

        if !meta.is_dir() {
            return match fs::remove_file(&dir) {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
                Err(err) => Err(HelperError::io("remove session dir", err)),
            };
        }
        remove_session_tree(&dir)
    }

    fn scan_sessions(&self) -> Result<Vec<ScannedSession>> {
        let entries = match fs::read_dir(self.storage.sessions_dir()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(HelperError::io("list sessions", err)),
        };

        let mut scanned = Vec::new();
        for entry in entries.flatten() {
            let Some(session_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_safe_id(&session_id) {
                continue;
            }
            let is_real_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_real_dir {
                scanned.push(ScannedSession::Unreadable { session_id });
                continue;
            }

            match read_json::<SessionRecord>(&self.storage.session_info_file(&session_id)) {
                Ok(Some(record)) if record.session_id == session_id => {
                    scanned.push(ScannedSession::Valid(record))
                }
                Ok(_) => scanned.push(ScannedSession::Unreadable { session_id }),
                Err(err) => {
                    tracing::debug!(session = %session_id, error = %err, "Unreadable session record");
                    scanned.push(ScannedSession::Unreadable { session_id });
                }
            }
        }

        scanned.sort_by(|a, b| scanned_id(a).cmp(scanned_id(b)));
        Ok(scanned)
    }

    fn put_pending(&self, item: &PendingItem) -> Result<()> {
        check_id("session", &item.session_id)?;
        check_id("item", &item.id)?;
        self.require_session(&item.session_id)?;

        create_session_subdir(&self.storage.pending_dir(&item.session_id), &item.session_id)?;
        write_json_atomic(&self.storage.pending_file(&item.session_id, &item.id), item)
            .map_err(|err| self.missing_or(&item.session_id, err))
    }

    fn list_pending(&self, session_id: &str) -> Result<Vec<PendingItem>> {
        check_id("session", session_id)?;
        if !self.session_exists(session_id) {
            return Ok(Vec::new());
        }

        let mut items: Vec<PendingItem> = list_json_dir(&self.storage.pending_dir(session_id))?
            .into_iter()
            .filter(|item: &PendingItem| item.session_id == session_id)
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    fn remove_pending(&self, session_id: &str, item_id: &str) -> Result<bool> {
        check_id("session", session_id)?;
        check_id("item", item_id)?;
        remove_if_exists(&self.storage.pending_file(session_id, item_id))
    }

    fn put_response(&self, session_id: &str, response: &ResponseRecord) -> Result<()> {
        check_id("session", session_id)?;
        check_id("item", &response.id)?;
        self.require_session(session_id)?;

        create_session_subdir(&self.storage.responses_dir(session_id), session_id)?;
        write_json_atomic(&self.storage.response_file(session_id, &response.id), response)
            .map_err(|err| self.missing_or(session_id, err))
    }

    fn load_response(&self, session_id: &str, item_id: &str) -> Result<Option<ResponseRecord>> {
        check_id("session", session_id)?;
        check_id("item", item_id)?;
        match read_json::<ResponseRecord>(&self.storage.response_file(session_id, item_id)) {
            Ok(response) => Ok(response.filter(|r| r.id == item_id)),
            Err(err @ HelperError::Json { .. }) => {
                tracing::debug!(session = %session_id, item = %item_id, error = %err, "Ignoring unreadable response");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn remove_response(&self, session_id: &str, item_id: &str) -> Result<bool> {
        check_id("session", session_id)?;
        check_id("item", item_id)?;
        remove_if_exists(&self.storage.response_file(session_id, item_id))
    }
}

impl FsStateStore {
    /// A write that lost a race with session deletion reports the session as missing.
    ///
    /// `NotFound` inside a session that existed a moment ago means the tree is
    /// being removed, even if the directory itself is still there.
    fn missing_or(&self, session_id: &str, err: HelperError) -> HelperError {
        if err.is_not_found_io() || !self.session_exists(session_id) {
            HelperError::SessionMissing(session_id.to_string())
        } else {
            err
        }
    }
}

fn scanned_id(entry: &ScannedSession) -> &str {
    match entry {
        ScannedSession::Valid(record) => &record.session_id,
        ScannedSession::Unreadable { session_id } => session_id,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(HelperError::io("read record", err)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| HelperError::json(format!("parse {}", path.display()), e))
}

/// Parses every `<safe id>.json` in `dir`, skipping temp files and corrupt documents.
fn list_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(HelperError::io("list records", err)),
    };

    let mut records = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_record = path.extension().is_some_and(|ext| ext == "json")
            && path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(is_safe_id);
        if !is_record {
            continue;
        }
        match read_json(&path) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(err) => tracing::debug!(path = %path.display(), error = %err, "Skipping unreadable record"),
        }
    }
    Ok(records)
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(HelperError::io("remove record", err)),
    }
}

/// Attempts at removing a session tree while writers keep landing files in it.
const DELETE_ATTEMPTS: usize = 16;

/// Removes a session directory, retrying while concurrent writes refill it.
///
/// A writer that placed a file after the tree walk makes the final `rmdir`
/// fail with `ENOTEMPTY`, and a file removed by someone else mid-walk reports
/// `NotFound`. Both are retried until the directory is gone.
fn remove_session_tree(dir: &Path) -> Result<bool> {
    let mut attempt = 1;
    loop {
        let err = match std::fs::remove_dir_all(dir) {
            Ok(()) => return Ok(true),
            Err(err) => err,
        };
        let still_there = fs::symlink_metadata(dir).is_ok();
        if !still_there {
            return Ok(err.kind() != ErrorKind::NotFound);
        }
        let retryable = err.kind() == ErrorKind::NotFound
            || err.raw_os_error() == Some(libc::ENOTEMPTY);
        if !retryable || attempt >= DELETE_ATTEMPTS {
            return Err(HelperError::io(
                format!("remove session dir {}", dir.display()),
                err,
            ));
        }
        tracing::debug!(path = %dir.display(), attempt, error = %err, "Retrying session removal");
        attempt += 1;
    }
}

fn private_dir_builder() -> std::fs::DirBuilder {
    #[allow(unused_mut)]
    let mut builder = std::fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
}

fn create_private_dir(path: &Path) -> Result<()> {
    private_dir_builder()
        .recursive(true)
        .create(path)
        .map_err(|e| HelperError::io(format!("create {}", path.display()), e))
}

/// Creates `pending/` or `responses/` inside an existing session directory.
///
/// Only the leaf is created: if the session directory is gone the write lost
/// a race with deletion and must not bring the session back.
fn create_session_subdir(path: &Path, session_id: &str) -> Result<()> {
    match private_dir_builder().create(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            Err(HelperError::SessionMissing(session_id.to_string()))
        }
        Err(err) => Err(HelperError::io(format!("create {}", path.display()), err)),
    }
}
