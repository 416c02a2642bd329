//! Login glue: password check against the stored hash, then a fresh auth
//! token with the previous ones expired.

use crate::ipc::error::{err, err_reasons, ok};
use crate::ipc::types::{AppState, Request};
use crate::token;
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

pub const ROLE_ADMIN: i64 = 1;
pub const ROLE_FACULTY: i64 = 2;
pub const ROLE_STUDENT: i64 = 3;

pub fn role_name(role: i64) -> &'static str {
    match role {
        ROLE_ADMIN => "Admin",
        ROLE_FACULTY => "Faculty",
        ROLE_STUDENT => "Student",
        _ => "Unknown",
    }
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginParams {
    username: Option<String>,
    password: Option<String>,
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let params: LoginParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let mut reasons = Vec::new();
    let username = params.username.unwrap_or_default().trim().to_string();
    if username.is_empty() {
        reasons.push("USERNAME: this field is required".to_string());
    }
    let password = params.password.unwrap_or_default();
    if password.is_empty() {
        reasons.push("PASSWORD: this field is required".to_string());
    }
    if !reasons.is_empty() {
        return err_reasons(&req.id, "invalid_request", "invalid login data", reasons);
    }

    let row: Option<(i64, String, i64)> = match conn
        .query_row(
            "SELECT id, password_hash, role FROM users WHERE username = ? AND is_active = 1",
            [&username],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Same rejection for unknown user and bad password.
    let Some((user_id, password_hash, role)) = row else {
        return err(&req.id, "invalid_credentials", "invalid username or password", None);
    };
    if hash_password(&password) != password_hash {
        return err(&req.id, "invalid_credentials", "invalid username or password", None);
    }
    if role == ROLE_ADMIN {
        return err(&req.id, "invalid_credentials", "log in as faculty or student", None);
    }

    // Students carry their enrolled course into the login payload.
    let course: Option<String> = match conn
        .query_row(
            "SELECT c.course_name FROM students s
             JOIN courses c ON c.id = s.course_id
             WHERE s.user_id = ? AND s.is_active = 1",
            [user_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let key = match token::issue_token(conn, user_id) {
        Ok(k) => k,
        Err(e) => {
            tracing::error!(error = ?e, "token issuance failed");
            return err(&req.id, "unexpected", "something went wrong", None);
        }
    };

    ok(
        &req.id,
        json!({
            "token": key,
            "username": username,
            "role": role,
            "roleName": role_name(role),
            "course": course,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        _ => None,
    }
}
