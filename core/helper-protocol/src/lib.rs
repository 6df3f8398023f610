//! Hook payload and decision types for Claude Helper.
//!
//! This crate owns the contract with Claude Code: the JSON document a hook
//! receives on stdin and the decision document a blocking hook prints on
//! stdout. Both the hook binary and the core library reuse these types so the
//! schema cannot drift between them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hook payloads larger than this are dropped without being parsed.
pub const MAX_INPUT_BYTES: usize = 1024 * 1024; // 1MB

/// Name of the driver's multiple-choice question tool.
pub const QUESTION_TOOL: &str = "AskUserQuestion";

/// Identifiers become path components, so only a conservative alphabet is allowed.
pub static RE_SAFE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,128}$").unwrap());

/// Returns true if `value` can be used as a session or item identifier.
pub fn is_safe_id(value: &str) -> bool {
    RE_SAFE_ID.is_match(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputError {
    pub code: String,
    pub message: String,
}

impl InputError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for InputError {}

// ═══════════════════════════════════════════════════════════════════════════════
// Hook Input (stdin)
// ═══════════════════════════════════════════════════════════════════════════════

/// The event payload Claude Code writes to a hook's stdin.
///
/// Every field is optional: Claude Code sends different subsets per event and
/// adds fields over time, so unknown fields are ignored rather than rejected.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HookInput {
    #[serde(default)]
    pub hook_event_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub notification_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stop_hook_active: Option<bool>,
}

impl HookInput {
    /// Parses a raw stdin payload, enforcing the size cap.
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        if raw.len() > MAX_INPUT_BYTES {
            return Err(InputError::new(
                "input_too_large",
                format!("hook input exceeds {} bytes", MAX_INPUT_BYTES),
            ));
        }
        serde_json::from_str(raw).map_err(|err| {
            InputError::new("invalid_json", format!("hook input is not valid JSON: {}", err))
        })
    }

    /// Returns the session id if present and safe to use as a path component.
    pub fn session_id(&self) -> Result<&str, InputError> {
        let id = match self.session_id.as_deref() {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(InputError::new("missing_field", "session_id is required")),
        };
        if !is_safe_id(id) {
            return Err(InputError::new(
                "invalid_session_id",
                "session_id contains unsupported characters",
            ));
        }
        Ok(id)
    }

    pub fn event_name(&self) -> &str {
        self.hook_event_name.as_deref().unwrap_or("")
    }

    pub fn tool_name(&self) -> &str {
        self.tool_name.as_deref().unwrap_or("")
    }

    pub fn is_question_tool(&self) -> bool {
        self.tool_name() == QUESTION_TOOL
    }

    /// The `tool_input` object, or an empty object when absent.
    pub fn tool_input_or_empty(&self) -> Value {
        self.tool_input
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Hook Output (stdout)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverDecision {
    Allow,
    Deny,
}

/// The decision document printed by a blocking hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookOutput {
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookSpecificOutput {
    #[serde(rename = "hookEventName")]
    pub hook_event_name: String,
    #[serde(rename = "permissionDecision")]
    pub permission_decision: DriverDecision,
    #[serde(rename = "permissionDecisionReason")]
    pub permission_decision_reason: String,
    #[serde(
        rename = "additionalContext",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_context: Option<String>,
}

impl HookOutput {
    /// Decision for a `PermissionRequest` hook.
    pub fn permission(decision: DriverDecision, reason: impl Into<String>) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: "PermissionRequest".to_string(),
                permission_decision: decision,
                permission_decision_reason: reason.into(),
                additional_context: None,
            },
        }
    }

    /// Decision for a `PreToolUse` hook, optionally carrying context for the model.
    pub fn pre_tool_use(
        decision: DriverDecision,
        reason: impl Into<String>,
        additional_context: Option<String>,
    ) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: "PreToolUse".to_string(),
                permission_decision: decision,
                permission_decision_reason: reason.into(),
                additional_context,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, InputError> {
        serde_json::to_string(self)
            .map_err(|err| InputError::new("serialize_failed", err.to_string()))
    }
}
