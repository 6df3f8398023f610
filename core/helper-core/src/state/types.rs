//! Serialized record types for the session state store.
//!
//! Three record kinds live in the store: one [`SessionRecord`] per session,
//! and per-session [`PendingItem`] and [`ResponseRecord`] sub-records keyed by
//! the same item id.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Client, Interaction, RequestKind, SessionStatus, WaitingFor};

// -----------------------------------------------------------------------------
// Session record
// -----------------------------------------------------------------------------

/// The single source of truth for a session's observable status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub cwd: String,
    pub project_name: String,
    /// Pid of the driver process that owns the session.
    #[serde(default)]
    pub parent_pid: Option<u32>,
    /// Start time of `parent_pid` (Unix seconds), used to detect pid reuse.
    #[serde(default)]
    pub parent_started: Option<u64>,
    #[serde(default)]
    pub client: Client,
    #[serde(default)]
    pub interaction: Interaction,
    pub status: SessionStatus,
    #[serde(default)]
    pub waiting_for: Option<WaitingFor>,
    /// Unix seconds; never decreases across writes.
    pub last_updated: i64,
    /// Incremented by the store on every applied write.
    #[serde(default)]
    pub revision: u64,
}

impl SessionRecord {
    /// A freshly created session: `working`, waiting for nothing.
    pub fn new(session_id: &str, cwd: &str, parent_pid: Option<u32>, now: i64) -> Self {
        SessionRecord {
            session_id: session_id.to_string(),
            cwd: cwd.to_string(),
            project_name: project_name_for(cwd),
            parent_pid,
            parent_started: None,
            client: Client::default(),
            interaction: Interaction::default(),
            status: SessionStatus::Working,
            waiting_for: None,
            last_updated: now,
            revision: 0,
        }
    }

    /// True if the record has not been written for longer than `threshold_secs`.
    pub fn is_stale(&self, now: i64, threshold_secs: i64) -> bool {
        now.saturating_sub(self.last_updated) > threshold_secs
    }

    /// Bumps the revision and advances `last_updated` without ever moving it back.
    pub(crate) fn stamp(&mut self, now: i64) {
        self.revision = self.revision.saturating_add(1);
        self.last_updated = self.last_updated.max(now);
    }
}

/// Display name for a working directory: its last path component.
pub fn project_name_for(cwd: &str) -> String {
    let trimmed = cwd.trim_end_matches('/');
    Path::new(trimmed)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| cwd.to_string())
}

// -----------------------------------------------------------------------------
// Pending items
// -----------------------------------------------------------------------------

/// One question of a multiple-choice elicitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub index: usize,
    pub question: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingRequest {
    Permission {
        tool_name: String,
        #[serde(default)]
        tool_input: Value,
        description: String,
    },
    Elicitation {
        questions: Vec<Question>,
    },
}

impl PendingRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            PendingRequest::Permission { .. } => RequestKind::Permission,
            PendingRequest::Elicitation { .. } => RequestKind::Elicitation,
        }
    }
}

/// An outstanding permission request or question, scoped to one session.
///
/// Pending items only feed the aggregator's menu content; they never change
/// the session's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    pub id: String,
    pub session_id: String,
    /// Pid of the handler waiting for a response. `None` marks a display-only
    /// item that nobody will consume an answer for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub request: PendingRequest,
}

impl PendingItem {
    pub fn kind(&self) -> RequestKind {
        self.request.kind()
    }

    pub fn is_answerable(&self) -> bool {
        self.pid.is_some()
    }

    pub fn questions(&self) -> &[Question] {
        match &self.request {
            PendingRequest::Elicitation { questions } => questions,
            PendingRequest::Permission { .. } => &[],
        }
    }

    /// One-line label for menus and logs.
    pub fn summary(&self) -> String {
        match &self.request {
            PendingRequest::Permission { description, .. } => description.clone(),
            PendingRequest::Elicitation { questions } => questions
                .first()
                .map(|q| q.question.clone())
                .unwrap_or_else(|| "Question".to_string()),
        }
    }
}

// -----------------------------------------------------------------------------
// Responses
// -----------------------------------------------------------------------------

/// A human's answer to a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionChoice {
    Allow,
    AlwaysAllow,
    Deny,
}

impl PermissionChoice {
    pub fn allows(self) -> bool {
        matches!(self, PermissionChoice::Allow | PermissionChoice::AlwaysAllow)
    }
}

impl From<String> for PermissionChoice {
    /// Anything unrecognized is a denial.
    fn from(value: String) -> Self {
        match value.as_str() {
            "allow" => PermissionChoice::Allow,
            "always_allow" => PermissionChoice::AlwaysAllow,
            _ => PermissionChoice::Deny,
        }
    }
}

impl From<PermissionChoice> for String {
    fn from(value: PermissionChoice) -> Self {
        match value {
            PermissionChoice::Allow => "allow",
            PermissionChoice::AlwaysAllow => "always_allow",
            PermissionChoice::Deny => "deny",
        }
        .to_string()
    }
}

impl std::str::FromStr for PermissionChoice {
    type Err = String;

    /// Strict parsing for user input; only the three known spellings are accepted.
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "allow" => Ok(PermissionChoice::Allow),
            "always_allow" | "always-allow" => Ok(PermissionChoice::AlwaysAllow),
            "deny" => Ok(PermissionChoice::Deny),
            other => Err(format!("unknown decision: {}", other)),
        }
    }
}

/// The aggregator's answer to exactly one pending item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<PermissionChoice>,
    /// Question index → chosen option label.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub answers: BTreeMap<usize, String>,
    pub responded_at: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn permission(item_id: &str, choice: PermissionChoice) -> Self {
        ResponseRecord {
            id: item_id.to_string(),
            decision: Some(choice),
            answers: BTreeMap::new(),
            responded_at: Utc::now(),
        }
    }

    pub fn answers(item_id: &str, answers: BTreeMap<usize, String>) -> Self {
        ResponseRecord {
            id: item_id.to_string(),
            decision: None,
            answers,
            responded_at: Utc::now(),
        }
    }
}
