//! Blocking request handler: raise a pending item, then wait for its response.
//!
//! ```text
//! put pending ──► status = permission|question ──► poll responses ─┬─► answered
//!                                                                  ├─► timed out
//!                                                                  ├─► session vanished (= timed out)
//!                                                                  └─► cancelled
//! every exit: remove pending + response, reset status (only if still ours)
//! ```
//!
//! Sessions whose interaction mode for the request kind is passthrough never
//! wait: the status is raised so the aggregator can show it, and the handler
//! returns [`RequestResult::HandledElsewhere`] at once.
//!
//! Time is read through [`Clock`] so tests can drive the loop without sleeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ulid::Ulid;

use crate::config::HelperConfig;
use crate::error::Result;
use crate::handlers::apply_event;
use crate::state::transition::SessionEvent;
use crate::state::types::{PendingItem, PendingRequest, ResponseRecord};
use crate::state::{StateStore, UpdateOutcome};
use crate::types::{RequestKind, RequestMode};

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn from_config(config: &HelperConfig) -> Self {
        WaitPolicy {
            timeout: config.request_timeout(),
            poll_interval: config.request_poll_interval(),
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from_config(&HelperConfig::default())
    }
}

/// Set from a signal handler (or another thread) to abandon the wait.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestResult {
    /// No session record: nothing was written.
    Untracked,
    /// Passthrough mode; the decision happens on another surface.
    HandledElsewhere,
    Answered(ResponseRecord),
    /// Deadline passed, or the session disappeared while waiting.
    TimedOut,
    Cancelled,
}

pub struct BlockingRequest<'a> {
    store: &'a dyn StateStore,
    clock: &'a dyn Clock,
    policy: WaitPolicy,
    cancel: CancelFlag,
    pid: u32,
}

impl<'a> BlockingRequest<'a> {
    pub fn new(store: &'a dyn StateStore, clock: &'a dyn Clock, policy: WaitPolicy) -> Self {
        BlockingRequest {
            store,
            clock,
            policy,
            cancel: CancelFlag::new(),
            pid: std::process::id(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pid recorded on the pending item so the aggregator can detect a dead waiter.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn run(&self, session_id: &str, request: PendingRequest) -> Result<RequestResult> {
        let Some(session) = self.store.load_session(session_id)? else {
            return Ok(RequestResult::Untracked);
        };
        let kind = request.kind();

        if session.interaction.mode_for(kind) == RequestMode::Passthrough {
            return self.pass_through(session_id, request);
        }

        let item = PendingItem {
            id: Ulid::new().to_string(),
            session_id: session_id.to_string(),
            pid: Some(self.pid),
            created_at: Utc::now(),
            request,
        };
        if !self.raise(&item)? {
            return Ok(RequestResult::Untracked);
        }
        tracing::info!(
            session = %session_id,
            item = %item.id,
            kind = kind.as_str(),
            pid = self.pid,
            "Waiting for response"
        );

        let result = self.wait(&item);
        self.finish(&item);

        let result = result?;
        match &result {
            RequestResult::Answered(_) => {
                tracing::info!(session = %session_id, item = %item.id, "Request answered")
            }
            RequestResult::TimedOut => {
                tracing::info!(session = %session_id, item = %item.id, "Request timed out")
            }
            RequestResult::Cancelled => {
                tracing::info!(session = %session_id, item = %item.id, "Request cancelled")
            }
            RequestResult::Untracked | RequestResult::HandledElsewhere => {}
        }
        Ok(result)
    }

    /// Permissions only raise the status; questions also leave a display-only
    /// item so the question text can be shown.
    fn pass_through(&self, session_id: &str, request: PendingRequest) -> Result<RequestResult> {
        let kind = request.kind();
        if kind == RequestKind::Elicitation {
            let item = PendingItem {
                id: Ulid::new().to_string(),
                session_id: session_id.to_string(),
                pid: None,
                created_at: Utc::now(),
                request,
            };
            if !self.raise(&item)? {
                return Ok(RequestResult::Untracked);
            }
        } else if apply_event(self.store, session_id, &SessionEvent::RequestStarted(kind))?
            == UpdateOutcome::Missing
        {
            return Ok(RequestResult::Untracked);
        }
        tracing::debug!(session = %session_id, kind = kind.as_str(), "Request passed through");
        Ok(RequestResult::HandledElsewhere)
    }

    /// Writes the item, then the status. Returns false if the session is gone.
    fn raise(&self, item: &PendingItem) -> Result<bool> {
        match self.store.put_pending(item) {
            Ok(()) => {}
            Err(err) if err.is_missing() => return Ok(false),
            Err(err) => return Err(err),
        }
        let outcome = apply_event(
            self.store,
            &item.session_id,
            &SessionEvent::RequestStarted(item.kind()),
        )?;
        if outcome == UpdateOutcome::Missing {
            self.store.remove_pending(&item.session_id, &item.id)?;
            return Ok(false);
        }
        Ok(true)
    }

    fn wait(&self, item: &PendingItem) -> Result<RequestResult> {
        let deadline = self.clock.now() + self.policy.timeout;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(RequestResult::Cancelled);
            }

            match self.store.load_response(&item.session_id, &item.id) {
                Ok(Some(response)) if is_complete(item, &response) => {
                    return Ok(RequestResult::Answered(response));
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(item = %item.id, error = %err, "Failed to read response")
                }
            }

            match self.store.load_session(&item.session_id) {
                Ok(None) => {
                    tracing::info!(session = %item.session_id, "Session vanished while waiting");
                    return Ok(RequestResult::TimedOut);
                }
                Ok(Some(_)) => {}
                Err(err) => {
                    tracing::warn!(session = %item.session_id, error = %err, "Failed to read session")
                }
            }

            if self.clock.now() >= deadline {
                return Ok(RequestResult::TimedOut);
            }
            self.clock.sleep(self.policy.poll_interval);
        }
    }

    /// Leaves no pending item or response behind, and clears the interactive
    /// status unless something newer replaced it.
    fn finish(&self, item: &PendingItem) {
        if let Err(err) = self.store.remove_pending(&item.session_id, &item.id) {
            tracing::warn!(item = %item.id, error = %err, "Failed to remove pending item");
        }
        if let Err(err) = self.store.remove_response(&item.session_id, &item.id) {
            tracing::warn!(item = %item.id, error = %err, "Failed to remove response");
        }
        if let Err(err) = apply_event(
            self.store,
            &item.session_id,
            &SessionEvent::RequestFinished(item.kind()),
        ) {
            tracing::warn!(session = %item.session_id, error = %err, "Failed to reset status");
        }
    }
}

/// A question response is consumed only once every question has an answer.
fn is_complete(item: &PendingItem, response: &ResponseRecord) -> bool {
    match &item.request {
        PendingRequest::Permission { .. } => response.decision.is_some(),
        PendingRequest::Elicitation { questions } => {
            !response.answers.is_empty()
                && questions
                    .iter()
                    .all(|q| response.answers.contains_key(&q.index))
        }
    }
}
