//! Response channel: the aggregator's only write path into a session.
//!
//! A human action is accepted only while it can still reach a waiting
//! handler: the pending item exists, has a live waiter recorded, and its
//! session still shows the matching interactive status. Anything else is
//! rejected with [`HelperError::StaleItem`] instead of writing a response
//! nobody will read.

use crate::error::{HelperError, Result};
use crate::state::types::{PendingItem, PendingRequest, PermissionChoice, ResponseRecord};
use crate::state::StateStore;
use crate::types::RequestKind;

pub fn respond_permission(
    store: &dyn StateStore,
    session_id: &str,
    item_id: &str,
    choice: PermissionChoice,
) -> Result<ResponseRecord> {
    let item = actionable_item(store, session_id, item_id, RequestKind::Permission)?;

    let response = ResponseRecord::permission(&item.id, choice);
    store.put_response(session_id, &response)?;
    tracing::info!(
        session = %session_id,
        item = %item_id,
        decision = %String::from(choice),
        "Permission answered"
    );
    Ok(response)
}

/// Records one question's answer, merged with any answers already given.
pub fn answer_question(
    store: &dyn StateStore,
    session_id: &str,
    item_id: &str,
    index: usize,
    label: &str,
) -> Result<ResponseRecord> {
    let item = actionable_item(store, session_id, item_id, RequestKind::Elicitation)?;

    let Some(question) = item.questions().iter().find(|q| q.index == index) else {
        return Err(stale(item_id, format!("no question {}", index)));
    };
    if !question.options.iter().any(|option| option == label) {
        return Err(stale(
            item_id,
            format!("{:?} is not an option of question {}", label, index),
        ));
    }

    let mut response = store
        .load_response(session_id, item_id)?
        .unwrap_or_else(|| ResponseRecord::answers(item_id, Default::default()));
    response.answers.insert(index, label.to_string());
    response.responded_at = chrono::Utc::now();

    store.put_response(session_id, &response)?;
    tracing::info!(
        session = %session_id,
        item = %item_id,
        question = index,
        answered = response.answers.len(),
        total = item.questions().len(),
        "Question answered"
    );
    Ok(response)
}

fn actionable_item(
    store: &dyn StateStore,
    session_id: &str,
    item_id: &str,
    kind: RequestKind,
) -> Result<PendingItem> {
    let Some(session) = store.load_session(session_id)? else {
        return Err(HelperError::SessionMissing(session_id.to_string()));
    };
    let Some(item) = store
        .list_pending(session_id)?
        .into_iter()
        .find(|item| item.id == item_id)
    else {
        return Err(HelperError::ItemMissing {
            session_id: session_id.to_string(),
            item_id: item_id.to_string(),
        });
    };

    if item.kind() != kind {
        return Err(stale(item_id, format!("item is a {} request", item.kind().as_str())));
    }
    if !item.is_answerable() {
        return Err(stale(item_id, "nobody is waiting for an answer"));
    }
    if session.status != kind.status() {
        return Err(stale(
            item_id,
            format!("session is {}, not {}", session.status, kind.status()),
        ));
    }
    if let PendingRequest::Elicitation { questions } = &item.request {
        if questions.is_empty() {
            return Err(stale(item_id, "no questions to answer"));
        }
    }
    Ok(item)
}

fn stale(item_id: &str, reason: impl Into<String>) -> HelperError {
    HelperError::StaleItem {
        item_id: item_id.to_string(),
        reason: reason.into(),
    }
}
