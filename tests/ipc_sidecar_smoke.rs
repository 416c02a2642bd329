mod test_support;

use serde_json::json;
use test_support::{sidecar_request, sidecar_request_ok, spawn_sidecar, temp_workspace};

#[test]
fn sidecar_round_trip_over_stdio() {
    let workspace = temp_workspace("marksheetd-sidecar");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = sidecar_request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(health["workspacePath"], serde_json::Value::Null);

    // Anything touching the database must wait for a workspace.
    let early = sidecar_request(&mut stdin, &mut reader, "2", "subjects.list", json!({ "examId": 1 }));
    assert_eq!(early["ok"], false);
    assert_eq!(early["error"]["code"], "no_workspace");

    sidecar_request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("marksheet.sqlite3").is_file());

    sidecar_request_ok(&mut stdin, &mut reader, "4", "exams.create", json!({ "name": "Semester 1" }));
    let exams = sidecar_request_ok(&mut stdin, &mut reader, "5", "exams.list", json!({}));
    assert_eq!(exams["exams"].as_array().expect("exams").len(), 1);
    assert_eq!(exams["exams"][0]["examName"], "Semester 1");

    let unknown = sidecar_request(&mut stdin, &mut reader, "6", "no.such.method", json!({}));
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown["error"]["code"], "not_implemented");

    let missing_params = sidecar_request(&mut stdin, &mut reader, "7", "marks.view", json!({}));
    assert_eq!(missing_params["error"]["code"], "bad_params");

    drop(stdin);
    let status = child.wait().expect("wait for sidecar exit");
    assert!(status.success());
}
