//! Human-readable labels for pending requests.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::state::types::Question;

const COMMAND_PREVIEW_CHARS: usize = 80;

/// One-line label for a permission request, e.g. `[Bash] run the tests`.
pub fn describe_permission(tool_name: &str, tool_input: &Value) -> String {
    let field = |name: &str| tool_input.get(name).and_then(Value::as_str).unwrap_or("");

    match tool_name {
        "Bash" => {
            let description = field("description");
            if !description.is_empty() {
                return format!("[Bash] {}", description);
            }
            let command = field("command");
            if command.chars().count() > COMMAND_PREVIEW_CHARS {
                let preview: String = command.chars().take(COMMAND_PREVIEW_CHARS).collect();
                format!("[Bash] {}...", preview)
            } else {
                format!("[Bash] {}", command)
            }
        }
        "Edit" | "Write" | "Read" => {
            let path = tool_input
                .get("file_path")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            format!("[{}] {}", tool_name, basename(path))
        }
        _ => format!("[{}]", tool_name),
    }
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Normalizes the question tool's `questions` array. Options may be plain
/// strings or objects carrying a `label`.
pub fn normalize_questions(tool_input: &Value) -> Vec<Question> {
    let Some(raw) = tool_input.get("questions").and_then(Value::as_array) else {
        return Vec::new();
    };

    raw.iter()
        .enumerate()
        .map(|(index, q)| Question {
            index,
            question: q
                .get("question")
                .and_then(Value::as_str)
                .unwrap_or("Question")
                .to_string(),
            header: q
                .get("header")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            options: q
                .get("options")
                .and_then(Value::as_array)
                .map(|options| options.iter().map(option_label).collect())
                .unwrap_or_default(),
        })
        .collect()
}

fn option_label(option: &Value) -> String {
    match option {
        Value::String(label) => label.clone(),
        Value::Object(map) => match map.get("label") {
            Some(Value::String(label)) => label.clone(),
            _ => option.to_string(),
        },
        other => other.to_string(),
    }
}

/// Context handed back to the model after questions were answered elsewhere.
pub fn answers_context(questions: &[Question], answers: &BTreeMap<usize, String>) -> String {
    let mut lines = vec!["The user responded via Claude Helper:".to_string()];
    for (index, answer) in answers {
        match questions.get(*index) {
            Some(q) => lines.push(format!("- {} -> {}", q.question, answer)),
            None => lines.push(format!("- Question {}: {}", index, answer)),
        }
    }
    lines.join("\n")
}
