//! Core enums shared by the hook, the store and the aggregator.
//!
//! The serialized spellings are the on-disk contract; renaming a variant
//! breaks records written by an older hook.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable status of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Working,
    Idle,
    Done,
    Permission,
    Question,
}

impl SessionStatus {
    /// Statuses in which the session is blocked on a human.
    pub const INTERACTIVE: [SessionStatus; 2] = [SessionStatus::Question, SessionStatus::Permission];

    pub fn is_interactive(self) -> bool {
        Self::INTERACTIVE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Working => "working",
            SessionStatus::Idle => "idle",
            SessionStatus::Done => "done",
            SessionStatus::Permission => "permission",
            SessionStatus::Question => "question",
        }
    }

    /// Menu ordering: questions first, then permissions, then sessions waiting
    /// on the user, then busy sessions.
    pub fn menu_rank(self) -> u8 {
        match self {
            SessionStatus::Question => 0,
            SessionStatus::Permission => 1,
            SessionStatus::Done | SessionStatus::Idle => 2,
            SessionStatus::Working => 3,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a session is waiting for. Serialized as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WaitingFor {
    Permission,
    Input,
    Elicitation,
    /// Free text, typically the title of an unrecognized notification.
    Other(String),
}

impl From<String> for WaitingFor {
    fn from(value: String) -> Self {
        match value.as_str() {
            "permission" => WaitingFor::Permission,
            "input" => WaitingFor::Input,
            "elicitation" => WaitingFor::Elicitation,
            _ => WaitingFor::Other(value),
        }
    }
}

impl From<WaitingFor> for String {
    fn from(value: WaitingFor) -> Self {
        match value {
            WaitingFor::Permission => "permission".to_string(),
            WaitingFor::Input => "input".to_string(),
            WaitingFor::Elicitation => "elicitation".to_string(),
            WaitingFor::Other(text) => text,
        }
    }
}

impl fmt::Display for WaitingFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitingFor::Permission => f.write_str("permission"),
            WaitingFor::Input => f.write_str("input"),
            WaitingFor::Elicitation => f.write_str("elicitation"),
            WaitingFor::Other(text) => f.write_str(text),
        }
    }
}

/// The surface the driver runs in, probed once at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Client {
    #[default]
    Terminal,
    Vscode,
}

/// Kinds of interactive artifact a blocking handler can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Permission,
    Elicitation,
}

impl RequestKind {
    /// Session status set while a request of this kind is outstanding.
    pub fn status(self) -> SessionStatus {
        match self {
            RequestKind::Permission => SessionStatus::Permission,
            RequestKind::Elicitation => SessionStatus::Question,
        }
    }

    pub fn waiting_for(self) -> WaitingFor {
        match self {
            RequestKind::Permission => WaitingFor::Permission,
            RequestKind::Elicitation => WaitingFor::Elicitation,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Permission => "permission",
            RequestKind::Elicitation => "elicitation",
        }
    }
}

/// Whether a blocking handler waits for the aggregator or hands off immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Suspend the driver until a Response arrives or the wait times out.
    Blocking,
    /// Return at once; the interactive experience happens on another surface.
    Passthrough,
}

/// Per-kind request modes, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub permissions: RequestMode,
    pub questions: RequestMode,
}

impl Default for Interaction {
    fn default() -> Self {
        Interaction {
            permissions: RequestMode::Blocking,
            questions: RequestMode::Passthrough,
        }
    }
}

impl Interaction {
    pub fn mode_for(&self, kind: RequestKind) -> RequestMode {
        match kind {
            RequestKind::Permission => self.permissions,
            RequestKind::Elicitation => self.questions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_for_round_trips_free_text() {
        let value = serde_json::to_value(WaitingFor::Other("Claude needs you".into())).unwrap();
        assert_eq!(value, serde_json::json!("Claude needs you"));
        let parsed: WaitingFor = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, WaitingFor::Other("Claude needs you".into()));
    }

    #[test]
    fn waiting_for_known_values_parse_to_variants() {
        let parsed: Option<WaitingFor> = serde_json::from_str(r#""elicitation""#).unwrap();
        assert_eq!(parsed, Some(WaitingFor::Elicitation));
        let parsed: Option<WaitingFor> = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn interactive_statuses() {
        assert!(SessionStatus::Question.is_interactive());
        assert!(SessionStatus::Permission.is_interactive());
        assert!(!SessionStatus::Working.is_interactive());
        assert!(!SessionStatus::Done.is_interactive());
        assert!(!SessionStatus::Idle.is_interactive());
    }

    #[test]
    fn default_interaction_blocks_permissions_only() {
        let interaction = Interaction::default();
        assert_eq!(
            interaction.mode_for(RequestKind::Permission),
            RequestMode::Blocking
        );
        assert_eq!(
            interaction.mode_for(RequestKind::Elicitation),
            RequestMode::Passthrough
        );
    }

    #[test]
    fn menu_rank_orders_attention_first() {
        let mut statuses = vec![
            SessionStatus::Working,
            SessionStatus::Done,
            SessionStatus::Permission,
            SessionStatus::Question,
        ];
        statuses.sort_by_key(|s| s.menu_rank());
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Question,
                SessionStatus::Permission,
                SessionStatus::Done,
                SessionStatus::Working,
            ]
        );
    }
}
