//! Plain-text rendering of a snapshot, laid out like the tray menu.

use std::fmt::Write;

use helper_core::{HelperConfig, PendingItem, PendingRequest, SessionStatus, SessionView, Snapshot};

pub fn render_menu(snapshot: &Snapshot, config: &HelperConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Claude Helper: {}", snapshot.state);

    if snapshot.sessions.is_empty() {
        out.push_str("  No active sessions\n");
        return out;
    }

    for view in &snapshot.sessions {
        render_session(&mut out, view, config);
    }
    out
}

fn session_label(view: &SessionView, icon: &str) -> String {
    match view.status {
        SessionStatus::Question => format!("{} {} - question", icon, view.project_name),
        SessionStatus::Permission => format!("{} {} - permission needed", icon, view.project_name),
        SessionStatus::Done | SessionStatus::Idle => {
            format!("{} {} - {}", icon, view.project_name, view.status)
        }
        SessionStatus::Working => format!("{} {}", icon, view.project_name),
    }
}

fn render_session(out: &mut String, view: &SessionView, config: &HelperConfig) {
    let _ = writeln!(out, "{}", session_label(view, config.icon_for(view.status)));

    for item in &view.pending {
        render_item(out, view, item);
    }

    if view.pending.is_empty() {
        let hint = match view.status {
            SessionStatus::Done | SessionStatus::Idle => "Waiting for your input",
            _ => "Working...",
        };
        let _ = writeln!(out, "    {}", hint);
    }
    if !view.cwd.is_empty() {
        let _ = writeln!(out, "    {}", view.cwd);
    }
}

fn render_item(out: &mut String, view: &SessionView, item: &PendingItem) {
    match &item.request {
        PendingRequest::Permission { description, .. } => {
            let _ = writeln!(out, "    {}", description);
            let _ = writeln!(
                out,
                "      Allow / Deny: claude-helper-daemon respond {} {} <allow|always-allow|deny>",
                view.session_id, item.id
            );
        }
        PendingRequest::Elicitation { questions } => {
            for question in questions {
                let _ = writeln!(out, "    {}", question.question);
                for option in &question.options {
                    let _ = writeln!(out, "      - {}", option);
                }
                if item.is_answerable() {
                    let _ = writeln!(
                        out,
                        "      Answer: claude-helper-daemon answer {} {} {} <option>",
                        view.session_id, item.id, question.index
                    );
                } else {
                    out.push_str("      Answer in terminal\n");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use helper_core::{AggregateState, Client, Question, WaitingFor};

    fn view(id: &str, status: SessionStatus, pending: Vec<PendingItem>) -> SessionView {
        SessionView {
            session_id: id.to_string(),
            project_name: format!("proj-{}", id),
            cwd: format!("/code/{}", id),
            status,
            waiting_for: None::<WaitingFor>,
            client: Client::Terminal,
            last_updated: 0,
            pending,
        }
    }

    fn snapshot(state: AggregateState, sessions: Vec<SessionView>) -> Snapshot {
        Snapshot {
            state,
            generated_at: Utc::now(),
            sessions,
            reclaimed: Vec::new(),
        }
    }

    #[test]
    fn empty_snapshot() {
        let text = render_menu(&snapshot(AggregateState::Empty, vec![]), &HelperConfig::default());
        assert_eq!(text, "Claude Helper: empty\n  No active sessions\n");
    }

    #[test]
    fn permission_session_lists_request_and_hint() {
        let item = PendingItem {
            id: "req1".to_string(),
            session_id: "a".to_string(),
            pid: Some(10),
            created_at: Utc::now(),
            request: PendingRequest::Permission {
                tool_name: "Bash".to_string(),
                tool_input: serde_json::json!({}),
                description: "[Bash] make".to_string(),
            },
        };
        let text = render_menu(
            &snapshot(
                AggregateState::Attention,
                vec![
                    view("a", SessionStatus::Permission, vec![item]),
                    view("b", SessionStatus::Working, vec![]),
                ],
            ),
            &HelperConfig::default(),
        );

        assert!(text.contains("\u{1F534} proj-a - permission needed\n"));
        assert!(text.contains("    [Bash] make\n"));
        assert!(text.contains("respond a req1 <allow|always-allow|deny>"));
        assert!(text.contains("\u{231b} proj-b\n    Working...\n    /code/b\n"));
    }

    #[test]
    fn display_only_questions_point_to_terminal() {
        let item = PendingItem {
            id: "q1".to_string(),
            session_id: "a".to_string(),
            pid: None,
            created_at: Utc::now(),
            request: PendingRequest::Elicitation {
                questions: vec![Question {
                    index: 0,
                    question: "Deploy now?".to_string(),
                    header: String::new(),
                    options: vec!["Yes".to_string(), "Later".to_string()],
                }],
            },
        };
        let text = render_menu(
            &snapshot(
                AggregateState::Attention,
                vec![view("a", SessionStatus::Question, vec![item])],
            ),
            &HelperConfig::default(),
        );

        assert!(text.contains("proj-a - question"));
        assert!(text.contains("    Deploy now?\n      - Yes\n      - Later\n      Answer in terminal\n"));
    }

    #[test]
    fn done_session_waits_for_input() {
        let text = render_menu(
            &snapshot(
                AggregateState::IdleAttention,
                vec![view("a", SessionStatus::Done, vec![])],
            ),
            &HelperConfig::default(),
        );
        assert!(text.contains("\u{1F7E1} proj-a - done\n    Waiting for your input\n"));
    }
}
