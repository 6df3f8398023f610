//! Drives the compiled hook binary the way Claude Code does: one process per
//! event, JSON on stdin, decision on stdout.

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::Duration;

use helper_core::{
    respond_permission, FsStateStore, HelperConfig, PermissionChoice, SessionStatus, StateStore,
    StorageConfig,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn spawn_hook(root: &Path, payload: &Value) -> Child {
    let mut child = Command::new(env!("CARGO_BIN_EXE_claude-helper-hook"))
        .arg("handle")
        .env("CLAUDE_HELPER_HOME", root)
        .env_remove("VSCODE_PID")
        .env_remove("CLAUDE_CODE_ENTRYPOINT")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn hook binary");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(payload.to_string().as_bytes())
        .expect("write payload");
    child
}

fn run_hook(root: &Path, payload: Value) -> Output {
    spawn_hook(root, &payload)
        .wait_with_output()
        .expect("hook output")
}

struct Fixture {
    _temp: TempDir,
    storage: StorageConfig,
}

impl Fixture {
    fn new(timeout_secs: u64) -> Self {
        let temp = TempDir::new().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("helper"));
        HelperConfig {
            request_timeout_secs: timeout_secs,
            request_poll_interval_ms: 50,
            ..HelperConfig::default()
        }
        .save(&storage)
        .unwrap();
        Fixture {
            _temp: temp,
            storage,
        }
    }

    fn root(&self) -> &Path {
        self.storage.root()
    }

    fn store(&self) -> FsStateStore {
        FsStateStore::new(self.storage.clone())
    }

    fn start_session(&self, session_id: &str) {
        let output = run_hook(
            self.root(),
            json!({"hook_event_name": "SessionStart", "session_id": session_id, "cwd": "/work/demo"}),
        );
        assert!(output.status.success());
        assert!(output.stdout.is_empty());
    }
}

fn permission_request(session_id: &str) -> Value {
    json!({
        "hook_event_name": "PermissionRequest",
        "session_id": session_id,
        "cwd": "/work/demo",
        "tool_name": "Bash",
        "tool_input": {"command": "git push", "description": "Push to origin"}
    })
}

fn decision(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("decision document on stdout")
}

#[test]
fn session_start_records_driver_pid() {
    let fixture = Fixture::new(5);
    fixture.start_session("flow-1");

    let record = fixture.store().load_session("flow-1").unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Working);
    assert_eq!(record.project_name, "demo");
    assert_eq!(record.parent_pid, Some(std::process::id()));
}

#[test]
fn permission_answered_from_aggregator_side() {
    let fixture = Fixture::new(30);
    fixture.start_session("flow-2");
    let store = fixture.store();

    let child = spawn_hook(fixture.root(), &permission_request("flow-2"));

    let mut item = None;
    for _ in 0..300 {
        let raised = store
            .load_session("flow-2")
            .unwrap()
            .is_some_and(|r| r.status == SessionStatus::Permission);
        if raised {
            item = store.list_pending("flow-2").unwrap().into_iter().next();
            if item.is_some() {
                break;
            }
        }
        thread::sleep(Duration::from_millis(20));
    }
    let item = item.expect("pending permission item");
    assert_eq!(item.summary(), "[Bash] Push to origin");
    respond_permission(&store, "flow-2", &item.id, PermissionChoice::Allow).unwrap();

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let document = decision(&output);
    assert_eq!(document["hookSpecificOutput"]["hookEventName"], "PermissionRequest");
    assert_eq!(document["hookSpecificOutput"]["permissionDecision"], "allow");

    assert!(store.list_pending("flow-2").unwrap().is_empty());
    assert!(store.load_response("flow-2", &item.id).unwrap().is_none());
    assert_eq!(
        store.load_session("flow-2").unwrap().unwrap().status,
        SessionStatus::Working
    );
}

#[test]
fn unanswered_permission_times_out_to_deny() {
    let fixture = Fixture::new(1);
    fixture.start_session("flow-3");

    let output = run_hook(fixture.root(), permission_request("flow-3"));
    assert!(output.status.success());
    assert_eq!(decision(&output)["hookSpecificOutput"]["permissionDecision"], "deny");
    assert!(fixture.store().list_pending("flow-3").unwrap().is_empty());
}

#[test]
fn garbage_input_is_ignored() {
    let fixture = Fixture::new(1);

    let mut child = Command::new(env!("CARGO_BIN_EXE_claude-helper-hook"))
        .arg("handle")
        .env("CLAUDE_HELPER_HOME", fixture.root())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"definitely not json")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(fixture.store().list_sessions().unwrap().is_empty());
}

#[test]
fn non_utf8_input_is_ignored() {
    let fixture = Fixture::new(1);
    fixture.start_session("flow-4");

    let mut child = Command::new(env!("CARGO_BIN_EXE_claude-helper-hook"))
        .arg("handle")
        .env("CLAUDE_HELPER_HOME", fixture.root())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"{\"hook_event_name\": \"Stop\", \"session_id\": \"flow-4\", \"cwd\": \"\xff\"}")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert_eq!(
        fixture.store().load_session("flow-4").unwrap().unwrap().status,
        SessionStatus::Working
    );
}

#[test]
fn untracked_session_gets_no_decision() {
    let fixture = Fixture::new(1);
    let output = run_hook(fixture.root(), permission_request("never-started"));
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}
