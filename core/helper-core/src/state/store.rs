//! The State Store abstraction shared by the hook handlers and the aggregator.
//!
//! Every component reaches session state through [`StateStore`]; nothing else
//! touches the medium directly. Two implementations exist:
//!
//! - [`FsStateStore`](super::FsStateStore): the directory tree under
//!   `~/.claude-helper/sessions`, shared across processes.
//! - [`MemoryStateStore`]: same semantics in a mutex-guarded map, for tests.
//!
//! # Consistency Rules
//!
//! - Session writes replace the whole record atomically.
//! - [`StateStore::update_session`] is a read-check-write: the closure sees the
//!   current record and returns `false` to leave it untouched (compare-and-set).
//! - Writing a pending item or response for a session that no longer exists
//!   fails with [`HelperError::SessionMissing`]; deleted sessions are never
//!   resurrected implicitly.
//! - Deletes are idempotent: removing something already gone returns `Ok(false)`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use claude_helper_protocol::is_safe_id;

use crate::error::{HelperError, Result};

use super::types::{PendingItem, ResponseRecord, SessionRecord};

/// Result of a conditional session update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The closure changed the record and the new version was written.
    Applied(SessionRecord),
    /// The closure declined; the stored record is unchanged.
    Unchanged(SessionRecord),
    /// No record exists for the session.
    Missing,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        match self {
            UpdateOutcome::Applied(record) | UpdateOutcome::Unchanged(record) => Some(record),
            UpdateOutcome::Missing => None,
        }
    }
}

/// One entry found while scanning the session tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ScannedSession {
    Valid(SessionRecord),
    /// A session directory whose record is missing or cannot be parsed.
    Unreadable { session_id: String },
}

pub trait StateStore {
    /// Writes a new session record, replacing any previous one (resume).
    fn create_session(&self, record: &SessionRecord) -> Result<()>;

    fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Read-check-write. `apply` mutates the record and returns whether it
    /// should be written. Applied writes are stamped (revision, last_updated).
    fn update_session(
        &self,
        session_id: &str,
        apply: &mut dyn FnMut(&mut SessionRecord) -> bool,
    ) -> Result<UpdateOutcome>;

    /// Deletes the session and all of its sub-records.
    fn delete_session(&self, session_id: &str) -> Result<bool>;

    fn scan_sessions(&self) -> Result<Vec<ScannedSession>>;

    fn put_pending(&self, item: &PendingItem) -> Result<()>;

    fn list_pending(&self, session_id: &str) -> Result<Vec<PendingItem>>;

    fn remove_pending(&self, session_id: &str, item_id: &str) -> Result<bool>;

    fn put_response(&self, session_id: &str, response: &ResponseRecord) -> Result<()>;

    fn load_response(&self, session_id: &str, item_id: &str) -> Result<Option<ResponseRecord>>;

    fn remove_response(&self, session_id: &str, item_id: &str) -> Result<bool>;

    /// Valid session records only.
    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        Ok(self
            .scan_sessions()?
            .into_iter()
            .filter_map(|entry| match entry {
                ScannedSession::Valid(record) => Some(record),
                ScannedSession::Unreadable { .. } => None,
            })
            .collect())
    }

    /// Reads a response once and deletes it.
    fn take_response(&self, session_id: &str, item_id: &str) -> Result<Option<ResponseRecord>> {
        let response = self.load_response(session_id, item_id)?;
        if response.is_some() {
            self.remove_response(session_id, item_id)?;
        }
        Ok(response)
    }
}

pub(crate) fn check_id(kind: &'static str, value: &str) -> Result<()> {
    if is_safe_id(value) {
        Ok(())
    } else {
        Err(HelperError::InvalidId {
            kind,
            value: value.to_string(),
        })
    }
}

pub(crate) fn now_secs() -> i64 {
    Utc::now().timestamp()
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory implementation
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MemorySession {
    record: Option<SessionRecord>,
    pending: BTreeMap<String, PendingItem>,
    responses: BTreeMap<String, ResponseRecord>,
}

/// Mutex-guarded store with the same semantics as the filesystem store.
#[derive(Default)]
pub struct MemoryStateStore {
    sessions: Mutex<HashMap<String, MemorySession>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemorySession>> {
        // A panicking test thread must not wedge every other user of the store.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a record as-is, without stamping.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn insert_raw(&self, record: SessionRecord) {
        let id = record.session_id.clone();
        self.lock().entry(id).or_default().record = Some(record);
    }

    /// A session entry with no readable record.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn insert_unreadable(&self, session_id: &str) {
        self.lock().entry(session_id.to_string()).or_default();
    }
}

impl StateStore for MemoryStateStore {
    fn create_session(&self, record: &SessionRecord) -> Result<()> {
        check_id("session", &record.session_id)?;
        let mut sessions = self.lock();
        let entry = sessions.entry(record.session_id.clone()).or_default();
        entry.record = Some(record.clone());
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        check_id("session", session_id)?;
        Ok(self
            .lock()
            .get(session_id)
            .and_then(|entry| entry.record.clone()))
    }

    fn update_session(
        &self,
        session_id: &str,
        apply: &mut dyn FnMut(&mut SessionRecord) -> bool,
    ) -> Result<UpdateOutcome> {
        check_id("session", session_id)?;
        let mut sessions = self.lock();
        let Some(record) = sessions
            .get_mut(session_id)
            .and_then(|entry| entry.record.as_mut())
        else {
            return Ok(UpdateOutcome::Missing);
        };

        let mut next = record.clone();
        if !apply(&mut next) {
            return Ok(UpdateOutcome::Unchanged(record.clone()));
        }
        next.stamp(now_secs());
        *record = next.clone();
        Ok(UpdateOutcome::Applied(next))
    }

    fn delete_session(&self, session_id: &str) -> Result<bool> {
        check_id("session", session_id)?;
        Ok(self.lock().remove(session_id).is_some())
    }

    fn scan_sessions(&self) -> Result<Vec<ScannedSession>> {
        let sessions = self.lock();
        let mut scanned: Vec<ScannedSession> = sessions
            .iter()
            .map(|(id, entry)| match &entry.record {
                Some(record) => ScannedSession::Valid(record.clone()),
                None => ScannedSession::Unreadable {
                    session_id: id.clone(),
                },
            })
            .collect();
        scanned.sort_by(|a, b| scanned_id(a).cmp(scanned_id(b)));
        Ok(scanned)
    }

    fn put_pending(&self, item: &PendingItem) -> Result<()> {
        check_id("session", &item.session_id)?;
        check_id("item", &item.id)?;
        let mut sessions = self.lock();
        let entry = sessions
            .get_mut(&item.session_id)
            .ok_or_else(|| HelperError::SessionMissing(item.session_id.clone()))?;
        entry.pending.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn list_pending(&self, session_id: &str) -> Result<Vec<PendingItem>> {
        check_id("session", session_id)?;
        Ok(self
            .lock()
            .get(session_id)
            .map(|entry| entry.pending.values().cloned().collect())
            .unwrap_or_default())
    }

    fn remove_pending(&self, session_id: &str, item_id: &str) -> Result<bool> {
        check_id("session", session_id)?;
        check_id("item", item_id)?;
        Ok(self
            .lock()
            .get_mut(session_id)
            .map(|entry| entry.pending.remove(item_id).is_some())
            .unwrap_or(false))
    }

    fn put_response(&self, session_id: &str, response: &ResponseRecord) -> Result<()> {
        check_id("session", session_id)?;
        check_id("item", &response.id)?;
        let mut sessions = self.lock();
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| HelperError::SessionMissing(session_id.to_string()))?;
        entry
            .responses
            .insert(response.id.clone(), response.clone());
        Ok(())
    }

    fn load_response(&self, session_id: &str, item_id: &str) -> Result<Option<ResponseRecord>> {
        check_id("session", session_id)?;
        check_id("item", item_id)?;
        Ok(self
            .lock()
            .get(session_id)
            .and_then(|entry| entry.responses.get(item_id).cloned()))
    }

    fn remove_response(&self, session_id: &str, item_id: &str) -> Result<bool> {
        check_id("session", session_id)?;
        check_id("item", item_id)?;
        Ok(self
            .lock()
            .get_mut(session_id)
            .map(|entry| entry.responses.remove(item_id).is_some())
            .unwrap_or(false))
    }
}

fn scanned_id(entry: &ScannedSession) -> &str {
    match entry {
        ScannedSession::Valid(record) => &record.session_id,
        ScannedSession::Unreadable { session_id } => session_id,
    }
}
