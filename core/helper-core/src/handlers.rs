//! Non-blocking event handlers.
//!
//! Each handler performs exactly one state change and returns. Addressing a
//! session whose record is gone is a benign no-op (`UpdateOutcome::Missing`
//! or `Ok(false)`), never an error: the session may have ended or been
//! reclaimed while the driver was still firing events.

use std::env;

use chrono::Utc;

use crate::config::{ElicitationMode, HelperConfig};
use crate::error::Result;
use crate::state::transition::{apply, transition_for, SessionEvent};
use crate::state::types::SessionRecord;
use crate::state::{StateStore, UpdateOutcome};
use crate::types::{Client, Interaction, RequestKind, RequestMode};

/// What the hook learned about the driver when the session began.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOrigin {
    pub parent_pid: Option<u32>,
    pub parent_started: Option<u64>,
    pub client: Client,
}

/// Detects the editor integration from the driver's environment.
pub fn detect_client(entrypoint: Option<&str>, vscode_pid: Option<&str>) -> Client {
    let from_entrypoint = entrypoint.is_some_and(|e| e.to_lowercase().contains("vscode"));
    let from_pid = vscode_pid.is_some_and(|p| !p.is_empty());
    if from_entrypoint || from_pid {
        Client::Vscode
    } else {
        Client::Terminal
    }
}

/// [`detect_client`] over the real process environment.
pub fn detect_client_from_env() -> Client {
    detect_client(
        env::var("CLAUDE_CODE_ENTRYPOINT").ok().as_deref(),
        env::var("VSCODE_PID").ok().as_deref(),
    )
}

/// Interaction modes snapshotted into a new session.
///
/// Editors bring their own permission dialog, so only terminal sessions block
/// on permissions. Questions block only when the user routes them to the menu.
pub fn interaction_for(client: Client, elicitation_mode: ElicitationMode) -> Interaction {
    let permissions = match client {
        Client::Terminal => RequestMode::Blocking,
        Client::Vscode => RequestMode::Passthrough,
    };
    let questions = if permissions == RequestMode::Blocking
        && elicitation_mode == ElicitationMode::Menubar
    {
        RequestMode::Blocking
    } else {
        RequestMode::Passthrough
    };
    Interaction {
        permissions,
        questions,
    }
}

/// Creates (or, on resume, replaces) the session record in `working`.
pub fn start_session(
    store: &dyn StateStore,
    session_id: &str,
    cwd: &str,
    origin: &SessionOrigin,
    config: &HelperConfig,
) -> Result<SessionRecord> {
    let mut record = SessionRecord::new(session_id, cwd, origin.parent_pid, Utc::now().timestamp());
    record.parent_started = origin.parent_started;
    record.client = origin.client;
    record.interaction = interaction_for(origin.client, config.elicitation_mode);

    store.create_session(&record)?;
    tracing::info!(
        session = %session_id,
        pid = ?origin.parent_pid,
        client = ?record.client,
        "Session started"
    );
    Ok(record)
}

/// Deletes the session and everything under it.
pub fn end_session(store: &dyn StateStore, session_id: &str) -> Result<bool> {
    let removed = store.delete_session(session_id)?;
    tracing::info!(session = %session_id, removed, "Session ended");
    Ok(removed)
}

/// Applies one transition-table event as a read-check-write.
pub fn apply_event(
    store: &dyn StateStore,
    session_id: &str,
    event: &SessionEvent,
) -> Result<UpdateOutcome> {
    let transition = transition_for(event);
    let outcome = store.update_session(session_id, &mut |record| apply(&transition, record))?;

    match &outcome {
        UpdateOutcome::Applied(record) => tracing::debug!(
            session = %session_id,
            ?event,
            status = %record.status,
            "Transition applied"
        ),
        UpdateOutcome::Unchanged(record) => tracing::debug!(
            session = %session_id,
            ?event,
            status = %record.status,
            "Guarded transition skipped"
        ),
        UpdateOutcome::Missing => {
            tracing::debug!(session = %session_id, ?event, "Event for untracked session")
        }
    }
    Ok(outcome)
}

/// Runs after the question tool completes: drops every question item of the
/// session and clears a lingering `question` status.
pub fn cleanup_questions(store: &dyn StateStore, session_id: &str) -> Result<usize> {
    let mut removed = 0;
    for item in store.list_pending(session_id)? {
        if item.kind() == RequestKind::Elicitation && store.remove_pending(session_id, &item.id)? {
            removed += 1;
        }
    }

    apply_event(
        store,
        session_id,
        &SessionEvent::RequestFinished(RequestKind::Elicitation),
    )?;
    if removed > 0 {
        tracing::debug!(session = %session_id, removed, "Question items cleaned up");
    }
    Ok(removed)
}
