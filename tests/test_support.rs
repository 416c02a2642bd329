//! Shared helpers for the integration suites. Most tests drive
//! `handle_request` directly against an in-process state; the stdio smoke
//! test spawns the sidecar binary instead.
#![allow(dead_code)]

use marksheetd::db;
use marksheetd::ipc::{handle_request, AppState, Request};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_workspace(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn request(
    state: &mut AppState,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    handle_request(
        state,
        Request {
            id: id.to_string(),
            method: method.to_string(),
            params,
        },
    )
}

pub fn request_ok(
    state: &mut AppState,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(state, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Opens a workspace configured to accept plain-text sheets so suites can
/// exercise the full pipeline without binary documents.
pub fn open_text_workspace(ws: &PathBuf) -> AppState {
    let mut state = AppState {
        workspace: None,
        db: None,
    };
    request_ok(
        &mut state,
        "ws",
        "workspace.select",
        json!({ "path": ws.to_string_lossy() }),
    );
    db::settings_set_json(
        state.db.as_ref().expect("db"),
        "ingest.verify",
        &json!({ "expectedExtension": "txt" }),
    )
    .expect("settings");
    state
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_marksheetd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn marksheetd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn sidecar_request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

pub fn sidecar_request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = sidecar_request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}
