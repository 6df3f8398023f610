//! The aggregator's poll cycle.
//!
//! Each cycle reads every session record, reclaims sessions whose driver is
//! gone, drops pending items nobody can answer, and derives one aggregate
//! state plus the menu content:
//!
//! | Surviving sessions contain | Aggregate |
//! |---|---|
//! | any `permission` / `question` | `attention` |
//! | else any `working` | `busy` |
//! | else any `done` / `idle` | `idle_attention` |
//! | nothing | `empty` |
//!
//! Only session records influence the aggregate. Pending items feed the
//! actionable list, and only while their session shows the matching
//! interactive status; an item that landed after a status reset is ignored.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic::write_json_atomic;
use crate::error::{HelperError, Result};
use crate::state::types::{PendingItem, SessionRecord};
use crate::state::{LivenessProbe, ScannedSession, StateStore};
use crate::storage::StorageConfig;
use crate::types::{Client, SessionStatus, WaitingFor};

/// Display-only items outlive a status change by this much before being purged.
pub const DISPLAY_ONLY_GRACE_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateState {
    Attention,
    Busy,
    IdleAttention,
    Empty,
}

impl AggregateState {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateState::Attention => "attention",
            AggregateState::Busy => "busy",
            AggregateState::IdleAttention => "idle_attention",
            AggregateState::Empty => "empty",
        }
    }
}

impl fmt::Display for AggregateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority order, independent of creation order or recency.
pub fn aggregate_state(statuses: impl IntoIterator<Item = SessionStatus>) -> AggregateState {
    let mut state = AggregateState::Empty;
    for status in statuses {
        match status {
            SessionStatus::Permission | SessionStatus::Question => return AggregateState::Attention,
            SessionStatus::Working => state = AggregateState::Busy,
            SessionStatus::Done | SessionStatus::Idle if state == AggregateState::Empty => {
                state = AggregateState::IdleAttention
            }
            SessionStatus::Done | SessionStatus::Idle => {}
        }
    }
    state
}

/// One session as exposed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub project_name: String,
    pub cwd: String,
    pub status: SessionStatus,
    pub waiting_for: Option<WaitingFor>,
    pub client: Client,
    pub last_updated: i64,
    /// Actionable (or display-only) items matching the session's status.
    pub pending: Vec<PendingItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: AggregateState,
    pub generated_at: DateTime<Utc>,
    pub sessions: Vec<SessionView>,
    #[serde(default)]
    pub reclaimed: Vec<String>,
}

impl Snapshot {
    /// Items a human can answer right now.
    pub fn actionable(&self) -> impl Iterator<Item = &PendingItem> {
        self.sessions
            .iter()
            .flat_map(|view| view.pending.iter())
            .filter(|item| item.is_answerable())
    }
}

pub struct Aggregator<'a> {
    store: &'a dyn StateStore,
    probe: &'a dyn LivenessProbe,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a dyn StateStore, probe: &'a dyn LivenessProbe) -> Self {
        Aggregator { store, probe }
    }

    pub fn poll(&self) -> Result<Snapshot> {
        self.poll_at(Utc::now())
    }

    pub fn poll_at(&self, now: DateTime<Utc>) -> Result<Snapshot> {
        let mut reclaimed = Vec::new();
        let mut views = Vec::new();

        for record in self.store.list_sessions()? {
            if !self.owner_alive(&record) {
                // Already gone is fine: another reclaimer or the end hook won.
                match self.store.delete_session(&record.session_id) {
                    Ok(_) => {
                        tracing::info!(
                            session = %record.session_id,
                            pid = ?record.parent_pid,
                            "Reclaimed dead session"
                        );
                        reclaimed.push(record.session_id);
                    }
                    Err(err) => tracing::warn!(
                        session = %record.session_id,
                        error = %err,
                        "Failed to reclaim dead session, retrying next cycle"
                    ),
                }
                continue;
            }

            let pending = match self.live_pending(&record, now) {
                Ok(pending) => pending,
                Err(err) => {
                    tracing::warn!(
                        session = %record.session_id,
                        error = %err,
                        "Failed to read pending items"
                    );
                    Vec::new()
                }
            };
            views.push(SessionView {
                session_id: record.session_id,
                project_name: record.project_name,
                cwd: record.cwd,
                status: record.status,
                waiting_for: record.waiting_for,
                client: record.client,
                last_updated: record.last_updated,
                pending,
            });
        }

        views.sort_by(|a, b| {
            a.status
                .menu_rank()
                .cmp(&b.status.menu_rank())
                .then_with(|| b.last_updated.cmp(&a.last_updated))
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        let state = aggregate_state(views.iter().map(|view| view.status));
        Ok(Snapshot {
            state,
            generated_at: now,
            sessions: views,
            reclaimed,
        })
    }

    /// Startup sweep: removes unreadable records and sessions idle for longer
    /// than `stale_after_secs`. Returns the removed ids.
    pub fn sweep(&self, now_secs: i64, stale_after_secs: i64) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for entry in self.store.scan_sessions()? {
            let (session_id, reason) = match entry {
                ScannedSession::Unreadable { session_id } => (session_id, "unreadable"),
                ScannedSession::Valid(record) if record.is_stale(now_secs, stale_after_secs) => {
                    (record.session_id, "stale")
                }
                ScannedSession::Valid(_) => continue,
            };
            if self.store.delete_session(&session_id)? {
                tracing::info!(session = %session_id, reason, "Swept session");
                removed.push(session_id);
            }
        }
        Ok(removed)
    }

    fn owner_alive(&self, record: &SessionRecord) -> bool {
        match record.parent_pid {
            Some(pid) => self.probe.is_alive(pid, record.parent_started),
            None => true,
        }
    }

    /// Purges unanswerable items and returns those matching the session status.
    fn live_pending(&self, record: &SessionRecord, now: DateTime<Utc>) -> Result<Vec<PendingItem>> {
        let mut kept = Vec::new();
        for item in self.store.list_pending(&record.session_id)? {
            let matches_status = item.kind().status() == record.status;

            let stale_reason = match item.pid {
                Some(pid) if !self.probe.is_alive(pid, None) => Some("waiter exited"),
                None if !matches_status
                    && now - item.created_at > Duration::seconds(DISPLAY_ONLY_GRACE_SECS) =>
                {
                    Some("display-only item outlived its status")
                }
                _ => None,
            };
            if let Some(reason) = stale_reason {
                self.store.remove_pending(&record.session_id, &item.id)?;
                tracing::info!(
                    session = %record.session_id,
                    item = %item.id,
                    kind = item.kind().as_str(),
                    reason,
                    "Purged stale pending item"
                );
                continue;
            }

            if record.status.is_interactive() && matches_status {
                kept.push(item);
            }
        }
        Ok(kept)
    }
}

/// Writes `status.json` for external renderers.
pub fn publish(storage: &StorageConfig, snapshot: &Snapshot) -> Result<()> {
    fs_err::create_dir_all(storage.root())
        .map_err(|e| HelperError::io("create storage root", e))?;
    write_json_atomic(&storage.status_file(), snapshot)
}

/// Reads the last published snapshot, if any.
pub fn read_published(storage: &StorageConfig) -> Result<Option<Snapshot>> {
    let path = storage.status_file();
    let content = match fs_err::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(HelperError::io("read status snapshot", err)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| HelperError::json("parse status snapshot", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::PendingRequest;
    use crate::state::MemoryStateStore;
    use tempfile::tempdir;

    fn record(id: &str, status: SessionStatus, pid: u32, last_updated: i64) -> SessionRecord {
        let mut record = SessionRecord::new(id, &format!("/code/{}", id), Some(pid), last_updated);
        record.status = status;
        record
    }

    fn item(session_id: &str, id: &str, pid: Option<u32>, request: PendingRequest) -> PendingItem {
        PendingItem {
            id: id.to_string(),
            session_id: session_id.to_string(),
            pid,
            created_at: Utc::now(),
            request,
        }
    }

    fn permission_request() -> PendingRequest {
        PendingRequest::Permission {
            tool_name: "Bash".to_string(),
            tool_input: serde_json::json!({}),
            description: "[Bash] ls".to_string(),
        }
    }

    fn everyone_alive(_: u32, _: Option<u64>) -> bool {
        true
    }

    #[test]
    fn aggregate_priority_ignores_order() {
        use SessionStatus::*;
        assert_eq!(aggregate_state([Working, Permission]), AggregateState::Attention);
        assert_eq!(aggregate_state([Permission, Working]), AggregateState::Attention);
        assert_eq!(aggregate_state([Done, Working]), AggregateState::Busy);
        assert_eq!(aggregate_state([Working, Idle]), AggregateState::Busy);
        assert_eq!(aggregate_state([Done, Question]), AggregateState::Attention);
        assert_eq!(aggregate_state([Done]), AggregateState::IdleAttention);
        assert_eq!(aggregate_state(Vec::<SessionStatus>::new()), AggregateState::Empty);
    }

    #[test]
    fn dead_owner_is_reclaimed() {
        let store = MemoryStateStore::new();
        store.insert_raw(record("alive", SessionStatus::Working, 100, 0));
        store.insert_raw(record("dead", SessionStatus::Permission, 200, 0));
        let probe = |pid: u32, _: Option<u64>| pid != 200;

        let snapshot = Aggregator::new(&store, &probe).poll().unwrap();
        assert_eq!(snapshot.reclaimed, vec!["dead".to_string()]);
        assert_eq!(snapshot.state, AggregateState::Busy);
        assert!(store.load_session("dead").unwrap().is_none());

        // Second cycle: nothing left to reclaim, no error.
        let snapshot = Aggregator::new(&store, &probe).poll().unwrap();
        assert!(snapshot.reclaimed.is_empty());
    }

    /// Delegates to a memory store but fails every sub-record call for one session.
    struct BrokenSessionStore {
        inner: MemoryStateStore,
        broken: &'static str,
    }

    impl BrokenSessionStore {
        fn check(&self, session_id: &str) -> Result<()> {
            if session_id == self.broken {
                Err(HelperError::io(
                    "remove session dir",
                    std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                ))
            } else {
                Ok(())
            }
        }
    }

    impl StateStore for BrokenSessionStore {
        fn create_session(&self, record: &SessionRecord) -> Result<()> {
            self.inner.create_session(record)
        }
        fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
            self.inner.load_session(session_id)
        }
        fn update_session(
            &self,
            session_id: &str,
            apply: &mut dyn FnMut(&mut SessionRecord) -> bool,
        ) -> Result<crate::state::UpdateOutcome> {
            self.inner.update_session(session_id, apply)
        }
        fn delete_session(&self, session_id: &str) -> Result<bool> {
            self.check(session_id)?;
            self.inner.delete_session(session_id)
        }
        fn scan_sessions(&self) -> Result<Vec<ScannedSession>> {
            self.inner.scan_sessions()
        }
        fn put_pending(&self, item: &PendingItem) -> Result<()> {
            self.inner.put_pending(item)
        }
        fn list_pending(&self, session_id: &str) -> Result<Vec<PendingItem>> {
            self.check(session_id)?;
            self.inner.list_pending(session_id)
        }
        fn remove_pending(&self, session_id: &str, item_id: &str) -> Result<bool> {
            self.inner.remove_pending(session_id, item_id)
        }
        fn put_response(
            &self,
            session_id: &str,
            response: &crate::state::ResponseRecord,
        ) -> Result<()> {
            self.inner.put_response(session_id, response)
        }
        fn load_response(
            &self,
            session_id: &str,
            item_id: &str,
        ) -> Result<Option<crate::state::ResponseRecord>> {
            self.inner.load_response(session_id, item_id)
        }
        fn remove_response(&self, session_id: &str, item_id: &str) -> Result<bool> {
            self.inner.remove_response(session_id, item_id)
        }
    }

    #[test]
    fn one_failing_session_does_not_abort_the_cycle() {
        let store = BrokenSessionStore {
            inner: MemoryStateStore::new(),
            broken: "stuck",
        };
        store.inner.insert_raw(record("stuck", SessionStatus::Permission, 200, 0));
        store.inner.insert_raw(record("dead", SessionStatus::Working, 200, 0));
        store.inner.insert_raw(record("alive", SessionStatus::Question, 100, 0));
        let probe = |pid: u32, _: Option<u64>| pid != 200;

        let snapshot = Aggregator::new(&store, &probe).poll().unwrap();
        assert_eq!(snapshot.reclaimed, vec!["dead".to_string()]);
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.sessions[0].session_id, "alive");
        assert_eq!(snapshot.state, AggregateState::Attention);
        // Failed reclamation is retried on the next cycle.
        assert!(store.load_session("stuck").unwrap().is_some());

        // A live session whose items cannot be listed is still shown.
        let probe = |_: u32, _: Option<u64>| true;
        let snapshot = Aggregator::new(&store, &probe).poll().unwrap();
        let stuck = snapshot
            .sessions
            .iter()
            .find(|view| view.session_id == "stuck")
            .unwrap();
        assert!(stuck.pending.is_empty());
    }

    #[test]
    fn items_only_show_for_matching_interactive_status() {
        let store = MemoryStateStore::new();
        store.insert_raw(record("waiting", SessionStatus::Permission, 1, 0));
        store.insert_raw(record("reset", SessionStatus::Working, 1, 0));
        store
            .put_pending(&item("waiting", "p1", Some(1), permission_request()))
            .unwrap();
        store
            .put_pending(&item("reset", "p2", Some(1), permission_request()))
            .unwrap();

        let snapshot = Aggregator::new(&store, &everyone_alive).poll().unwrap();
        let ids: Vec<_> = snapshot.actionable().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["p1"]);
        // The late item is hidden, not deleted: its waiter is still alive.
        assert_eq!(store.list_pending("reset").unwrap().len(), 1);
    }

    #[test]
    fn dead_waiter_items_are_purged() {
        let store = MemoryStateStore::new();
        store.insert_raw(record("s1", SessionStatus::Permission, 1, 0));
        store
            .put_pending(&item("s1", "p1", Some(999), permission_request()))
            .unwrap();
        let probe = |pid: u32, _: Option<u64>| pid != 999;

        let snapshot = Aggregator::new(&store, &probe).poll().unwrap();
        assert_eq!(snapshot.actionable().count(), 0);
        assert!(store.list_pending("s1").unwrap().is_empty());
    }

    #[test]
    fn display_only_items_get_a_grace_period() {
        let store = MemoryStateStore::new();
        store.insert_raw(record("s1", SessionStatus::Working, 1, 0));
        let question = PendingRequest::Elicitation { questions: vec![] };
        store
            .put_pending(&item("s1", "q1", None, question))
            .unwrap();
        let aggregator = Aggregator::new(&store, &everyone_alive);

        aggregator.poll_at(Utc::now()).unwrap();
        assert_eq!(store.list_pending("s1").unwrap().len(), 1);

        aggregator
            .poll_at(Utc::now() + Duration::seconds(DISPLAY_ONLY_GRACE_SECS + 1))
            .unwrap();
        assert!(store.list_pending("s1").unwrap().is_empty());
    }

    #[test]
    fn menu_order_puts_attention_first() {
        let store = MemoryStateStore::new();
        store.insert_raw(record("w", SessionStatus::Working, 1, 50));
        store.insert_raw(record("d_old", SessionStatus::Done, 1, 10));
        store.insert_raw(record("d_new", SessionStatus::Idle, 1, 20));
        store.insert_raw(record("p", SessionStatus::Permission, 1, 1));
        store.insert_raw(record("q", SessionStatus::Question, 1, 1));

        let snapshot = Aggregator::new(&store, &everyone_alive).poll().unwrap();
        let order: Vec<_> = snapshot
            .sessions
            .iter()
            .map(|view| view.session_id.as_str())
            .collect();
        assert_eq!(order, vec!["q", "p", "d_new", "d_old", "w"]);
    }

    #[test]
    fn sweep_removes_unreadable_and_stale() {
        let store = MemoryStateStore::new();
        store.insert_raw(record("fresh", SessionStatus::Working, 1, 1_000));
        store.insert_raw(record("old", SessionStatus::Done, 1, 10));
        store.insert_unreadable("broken");

        let removed = Aggregator::new(&store, &everyone_alive)
            .sweep(1_000, 500)
            .unwrap();
        assert_eq!(removed, vec!["broken".to_string(), "old".to_string()]);
        assert!(store.load_session("fresh").unwrap().is_some());
    }

    #[test]
    fn publish_then_read_back() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("helper"));
        assert!(read_published(&storage).unwrap().is_none());

        let store = MemoryStateStore::new();
        store.insert_raw(record("s1", SessionStatus::Done, 1, 5));
        let snapshot = Aggregator::new(&store, &everyone_alive).poll().unwrap();

        publish(&storage, &snapshot).unwrap();
        assert_eq!(read_published(&storage).unwrap(), Some(snapshot));
    }
}
