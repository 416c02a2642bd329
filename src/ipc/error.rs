use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}

/// Rejection whose details carry a human-readable reason list, the shape the
/// form-style handlers report validation problems in.
pub fn err_reasons(
    id: &str,
    code: &str,
    message: impl Into<String>,
    reasons: Vec<String>,
) -> Value {
    err(id, code, message, Some(json!({ "reasons": reasons })))
}
