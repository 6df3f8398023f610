//! Event handler for Claude Code hooks.
//!
//! Reads JSON from stdin, routes the event, and updates session state.
//!
//! ## Routing
//!
//! ```text
//! SessionStart                     → create session (working)
//! SessionEnd                       → delete session tree
//! UserPromptSubmit                 → working
//! PreToolUse  (AskUserQuestion)    → question request (blocking or passthrough)
//! PostToolUse (AskUserQuestion)    → drop question items, then tool activity
//! PostToolUse (other)              → tool activity (resets permission/question only)
//! PermissionRequest                → permission request (blocking or passthrough)
//! Notification                     → idle / permission, classified by type or title
//! Stop                             → done   (unless stop_hook_active=true)
//! ```
//!
//! Blocking requests print a decision document on stdout. Everything else
//! prints nothing. Malformed input is dropped without touching state.

use std::io::{self, Read};

use claude_helper_protocol::{DriverDecision, HookInput, HookOutput, MAX_INPUT_BYTES};
use helper_core::describe::{answers_context, describe_permission, normalize_questions};
use helper_core::handlers::detect_client_from_env;
use helper_core::state::liveness::process_start_time;
use helper_core::{
    apply_event, cleanup_questions, end_session, start_session, BlockingRequest, CancelFlag,
    Clock, FsStateStore, HelperConfig, PendingRequest, RequestKind, RequestMode, RequestResult,
    SessionEvent, SessionOrigin, StateStore, StorageConfig, SystemClock, WaitPolicy,
};

/// How the hook process should finish.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Exit 0 with no output.
    Done,
    /// Exit 0 after printing this document.
    Decision(HookOutput),
    /// The wait was interrupted; exit 1 so the driver falls back to its own prompt.
    Cancelled,
}

pub fn run(storage: StorageConfig) -> Result<Outcome, String> {
    let mut raw = Vec::new();
    io::stdin()
        .take(MAX_INPUT_BYTES as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(|e| format!("Failed to read stdin: {}", e))?;

    let Some(input) = decode_input(raw) else {
        return Ok(Outcome::Done);
    };

    let config = HelperConfig::load(&storage);
    let store = FsStateStore::new(storage);
    let cancel = CancelFlag::new();
    if is_blocking_event(&input) {
        install_cancel_handler(&cancel);
    }

    let hook = Hook {
        store: &store,
        config: &config,
        clock: &SystemClock,
        cancel,
    };
    hook.dispatch(&input, current_origin).map_err(|e| e.to_string())
}

/// Malformed payloads (not UTF-8, not JSON, oversized) are dropped silently.
fn decode_input(raw: Vec<u8>) -> Option<HookInput> {
    let raw = match String::from_utf8(raw) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!(error = %err, "Dropping non-UTF-8 hook input");
            return None;
        }
    };
    if raw.trim().is_empty() {
        return None;
    }
    match HookInput::parse(&raw) {
        Ok(input) => Some(input),
        Err(err) => {
            tracing::debug!(code = %err.code, "Dropping hook input");
            None
        }
    }
}

fn is_blocking_event(input: &HookInput) -> bool {
    match input.event_name() {
        "PermissionRequest" => true,
        "PreToolUse" => input.is_question_tool(),
        _ => false,
    }
}

/// SIGINT, SIGTERM and SIGHUP all end the wait through the same flag.
fn install_cancel_handler(cancel: &CancelFlag) {
    let cancel = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || cancel.cancel()) {
        tracing::warn!(error = %err, "Failed to install signal handler");
    }
}

fn current_origin() -> SessionOrigin {
    let parent_pid = get_ppid();
    SessionOrigin {
        parent_pid,
        parent_started: parent_pid.and_then(process_start_time),
        client: detect_client_from_env(),
    }
}

/// The driver process that invoked this hook.
fn get_ppid() -> Option<u32> {
    #[cfg(unix)]
    {
        // SAFETY: getppid has no preconditions and cannot fail.
        let ppid = unsafe { libc::getppid() };
        if ppid > 1 {
            return Some(ppid as u32);
        }
    }
    None
}

pub struct Hook<'a> {
    pub store: &'a dyn StateStore,
    pub config: &'a HelperConfig,
    pub clock: &'a dyn Clock,
    pub cancel: CancelFlag,
}

impl Hook<'_> {
    pub fn dispatch(
        &self,
        input: &HookInput,
        origin: impl FnOnce() -> SessionOrigin,
    ) -> helper_core::Result<Outcome> {
        let session_id = match input.session_id() {
            Ok(id) => id,
            Err(err) => {
                tracing::debug!(
                    event = %input.event_name(),
                    code = %err.code,
                    "Skipping event (no usable session_id)"
                );
                return Ok(Outcome::Done);
            }
        };

        match input.event_name() {
            "SessionStart" => {
                let cwd = input.cwd.as_deref().unwrap_or("unknown");
                start_session(self.store, session_id, cwd, &origin(), self.config)?;
            }
            "SessionEnd" => {
                end_session(self.store, session_id)?;
            }
            "UserPromptSubmit" => {
                apply_event(self.store, session_id, &SessionEvent::PromptSubmitted)?;
            }
            "PreToolUse" if input.is_question_tool() => {
                return self.ask_questions(session_id, input);
            }
            "PostToolUse" => {
                if input.is_question_tool() {
                    cleanup_questions(self.store, session_id)?;
                }
                apply_event(self.store, session_id, &SessionEvent::ToolActivity)?;
            }
            "PermissionRequest" => {
                return self.request_permission(session_id, input);
            }
            "Notification" => {
                let event = SessionEvent::Notification {
                    notification_type: input.notification_type.clone(),
                    title: input.title.clone(),
                };
                apply_event(self.store, session_id, &event)?;
            }
            "Stop" => {
                if input.stop_hook_active == Some(true) {
                    tracing::debug!(session = %session_id, "Stop hook active, ignoring");
                } else {
                    apply_event(self.store, session_id, &SessionEvent::Stopped)?;
                }
            }
            other => {
                tracing::debug!(event = %other, session = %session_id, "Ignoring event");
            }
        }
        Ok(Outcome::Done)
    }

    fn blocking_request(&self) -> BlockingRequest<'_> {
        BlockingRequest::new(self.store, self.clock, WaitPolicy::from_config(self.config))
            .with_cancel(self.cancel.clone())
    }

    fn request_permission(&self, session_id: &str, input: &HookInput) -> helper_core::Result<Outcome> {
        let tool_name = input.tool_name().to_string();
        let tool_input = input.tool_input_or_empty();
        let description = describe_permission(&tool_name, &tool_input);
        let request = PendingRequest::Permission {
            tool_name,
            tool_input,
            description,
        };

        let outcome = match self.blocking_request().run(session_id, request)? {
            RequestResult::Answered(response) => {
                let allowed = response.decision.is_some_and(|choice| choice.allows());
                let (decision, reason) = if allowed {
                    (DriverDecision::Allow, "Approved via Claude Helper")
                } else {
                    (DriverDecision::Deny, "Denied via Claude Helper")
                };
                Outcome::Decision(HookOutput::permission(decision, reason))
            }
            RequestResult::TimedOut => Outcome::Decision(HookOutput::permission(
                DriverDecision::Deny,
                format!(
                    "No response from Claude Helper within {}s",
                    self.config.request_timeout_secs
                ),
            )),
            RequestResult::Cancelled => Outcome::Cancelled,
            RequestResult::Untracked | RequestResult::HandledElsewhere => Outcome::Done,
        };
        Ok(outcome)
    }

    fn ask_questions(&self, session_id: &str, input: &HookInput) -> helper_core::Result<Outcome> {
        let questions = normalize_questions(&input.tool_input_or_empty());
        if questions.is_empty() {
            return Ok(Outcome::Done);
        }

        let blocking = self
            .store
            .load_session(session_id)?
            .is_some_and(|s| s.interaction.mode_for(RequestKind::Elicitation) == RequestMode::Blocking);
        if blocking {
            print_question_hint(&questions);
        }

        let request = PendingRequest::Elicitation {
            questions: questions.clone(),
        };
        let outcome = match self.blocking_request().run(session_id, request)? {
            RequestResult::Answered(response) => Outcome::Decision(HookOutput::pre_tool_use(
                DriverDecision::Deny,
                "User answered via Claude Helper",
                Some(answers_context(&questions, &response.answers)),
            )),
            RequestResult::TimedOut => Outcome::Decision(HookOutput::pre_tool_use(
                DriverDecision::Allow,
                "No answer from Claude Helper; answer in the terminal instead",
                None,
            )),
            RequestResult::Cancelled => Outcome::Cancelled,
            RequestResult::Untracked | RequestResult::HandledElsewhere => Outcome::Done,
        };
        Ok(outcome)
    }
}

/// Tells the person at the terminal where the question went.
fn print_question_hint(questions: &[helper_core::Question]) {
    eprintln!("\n  [Claude Helper] Question pending in the menu:");
    for question in questions {
        eprintln!("    {}", question.question);
        for (n, option) in question.options.iter().enumerate() {
            eprintln!("      {}) {}", n + 1, option);
        }
    }
    eprintln!("  Answer in the menu, or Ctrl+C to answer here.\n");
}
