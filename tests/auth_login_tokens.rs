mod test_support;

use marksheetd::ipc::AppState;
use serde_json::json;
use test_support::{request, request_ok, temp_workspace};

fn setup(prefix: &str) -> AppState {
    let ws = temp_workspace(prefix);
    let mut state = AppState {
        workspace: None,
        db: None,
    };
    request_ok(&mut state, "ws", "workspace.select", json!({ "path": ws.to_string_lossy() }));
    request_ok(&mut state, "c", "courses.create", json!({ "name": "BSC" }));
    request_ok(
        &mut state,
        "s",
        "students.create",
        json!({ "username": "fay", "name": "Fay", "registrationNo": "R-9", "courseId": 1 }),
    );
    state
}

#[test]
fn login_with_default_password_issues_a_fresh_token() {
    let mut state = setup("marksheetd-login");

    // Students are created with the roster default password.
    let first = request_ok(
        &mut state,
        "l1",
        "auth.login",
        json!({ "username": "fay", "password": "12345" }),
    );
    let first_token = first["token"].as_str().expect("token").to_string();
    assert_eq!(first_token.len(), 20);
    assert!(first_token
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    assert_eq!(first["roleName"], "Student");
    assert_eq!(first["course"], "BSC");

    let second = request_ok(
        &mut state,
        "l2",
        "auth.login",
        json!({ "username": "fay", "password": "12345" }),
    );
    let second_token = second["token"].as_str().expect("token");
    assert_ne!(first_token, second_token);

    // Re-login expired the earlier token.
    let expired: bool = state
        .db
        .as_ref()
        .expect("db")
        .query_row(
            "SELECT is_expired FROM auth_tokens WHERE key = ?",
            [&first_token],
            |r| r.get(0),
        )
        .expect("token row");
    assert!(expired);
}

#[test]
fn bad_credentials_and_missing_fields_are_rejected() {
    let mut state = setup("marksheetd-login-bad");

    let wrong = request(
        &mut state,
        "l",
        "auth.login",
        json!({ "username": "fay", "password": "not-it" }),
    );
    assert_eq!(wrong["ok"], false);
    assert_eq!(wrong["error"]["code"], "invalid_credentials");

    let unknown = request(
        &mut state,
        "l",
        "auth.login",
        json!({ "username": "ghost", "password": "12345" }),
    );
    assert_eq!(unknown["error"]["code"], "invalid_credentials");

    let empty = request(&mut state, "l", "auth.login", json!({}));
    assert_eq!(empty["error"]["code"], "invalid_request");
    let reasons = empty["error"]["details"]["reasons"].as_array().expect("reasons");
    assert_eq!(reasons.len(), 2);
}
