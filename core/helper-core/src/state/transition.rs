//! Maps driver lifecycle events to session status transitions.
//!
//! Most transitions are unconditional (last writer wins). Resets to `working`
//! triggered by tool activity or a finished request are compare-and-set: they
//! only apply while the session still shows the interactive status they are
//! meant to clear, so a late reset cannot clobber a newer state.

use crate::types::{RequestKind, SessionStatus, WaitingFor};

use super::types::SessionRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PromptSubmitted,
    /// Any tool finished running.
    ToolActivity,
    /// A blocking request (or its passthrough stand-in) is now outstanding.
    RequestStarted(RequestKind),
    /// The request raised by this session is over (answered, timed out, cancelled).
    RequestFinished(RequestKind),
    Notification {
        notification_type: Option<String>,
        title: Option<String>,
    },
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Set {
        status: SessionStatus,
        waiting_for: Option<WaitingFor>,
    },
    /// Applied only when the current status is one of `from`.
    SetIf {
        from: Vec<SessionStatus>,
        status: SessionStatus,
        waiting_for: Option<WaitingFor>,
    },
}

pub fn transition_for(event: &SessionEvent) -> Transition {
    match event {
        SessionEvent::PromptSubmitted => Transition::Set {
            status: SessionStatus::Working,
            waiting_for: None,
        },
        SessionEvent::ToolActivity => Transition::SetIf {
            from: SessionStatus::INTERACTIVE.to_vec(),
            status: SessionStatus::Working,
            waiting_for: None,
        },
        SessionEvent::RequestStarted(kind) => Transition::Set {
            status: kind.status(),
            waiting_for: Some(kind.waiting_for()),
        },
        SessionEvent::RequestFinished(kind) => Transition::SetIf {
            from: vec![kind.status()],
            status: SessionStatus::Working,
            waiting_for: None,
        },
        SessionEvent::Notification {
            notification_type,
            title,
        } => {
            let (status, waiting_for) =
                classify_notification(notification_type.as_deref(), title.as_deref());
            Transition::Set {
                status,
                waiting_for: Some(waiting_for),
            }
        }
        SessionEvent::Stopped => Transition::Set {
            status: SessionStatus::Done,
            waiting_for: Some(WaitingFor::Input),
        },
    }
}

/// Matches on `notification_type` when present, else on the title.
pub fn classify_notification(
    notification_type: Option<&str>,
    title: Option<&str>,
) -> (SessionStatus, WaitingFor) {
    let title = title.filter(|t| !t.is_empty()).unwrap_or("notification");
    let key = notification_type
        .filter(|t| !t.is_empty())
        .unwrap_or(title)
        .to_lowercase();

    if key.contains("permission") {
        (SessionStatus::Permission, WaitingFor::Permission)
    } else if key.contains("idle") || key.contains("input") {
        (SessionStatus::Idle, WaitingFor::Input)
    } else if key.contains("elicitation") {
        (SessionStatus::Idle, WaitingFor::Elicitation)
    } else {
        (SessionStatus::Idle, WaitingFor::from(title.to_string()))
    }
}

/// Applies `transition` to `record` in place. Returns false when a guarded
/// transition did not match, in which case the record is untouched.
pub fn apply(transition: &Transition, record: &mut SessionRecord) -> bool {
    let (status, waiting_for) = match transition {
        Transition::Set {
            status,
            waiting_for,
        } => (status, waiting_for),
        Transition::SetIf {
            from,
            status,
            waiting_for,
        } => {
            if !from.contains(&record.status) {
                return false;
            }
            (status, waiting_for)
        }
    };
    record.status = *status;
    record.waiting_for = waiting_for.clone();
    true
}
