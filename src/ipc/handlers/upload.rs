//! The mark-sheet upload endpoint. Parses and validates the request in one
//! pass, resolves the student and exam, then hands off to the ingestion
//! transaction. The stored document is content-addressed under the
//! workspace's `mark_sheets/` directory.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::ingest::{self, IngestError, IngestRequest, STATUS_PENDING};
use crate::ipc::error::{err, err_reasons, ok};
use crate::ipc::types::{AppState, Request};
use crate::pdf;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UploadParams {
    student_id: Option<i64>,
    /// Clients have been seen sending the exam id as a number, a numeric
    /// string, or the literal "undefined"; only the first two are valid.
    exam_id: Option<serde_json::Value>,
    file_name: Option<String>,
    doc_base64: Option<String>,
}

struct ValidUpload {
    student_id: i64,
    exam_id: i64,
    file_name: String,
    doc: Vec<u8>,
}

impl UploadParams {
    fn validate(self) -> Result<ValidUpload, Vec<String>> {
        let mut reasons = Vec::new();

        let student_id = match self.student_id {
            Some(id) if id > 0 => id,
            _ => {
                reasons.push("provide the uploading student".to_string());
                0
            }
        };

        let exam_id = match self.exam_id {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        };
        if exam_id <= 0 {
            reasons.push("choose an examination".to_string());
        }

        let file_name = self.file_name.unwrap_or_default();
        let doc = match self.doc_base64.as_deref() {
            None | Some("") | Some("undefined") => {
                reasons.push("choose a file to upload".to_string());
                Vec::new()
            }
            Some(b64) => match BASE64.decode(b64) {
                Ok(bytes) if !bytes.is_empty() => bytes,
                _ => {
                    reasons.push("choose a file to upload".to_string());
                    Vec::new()
                }
            },
        };
        if file_name.trim().is_empty() {
            reasons.push("provide the uploaded file name".to_string());
        }

        if !reasons.is_empty() {
            return Err(reasons);
        }
        Ok(ValidUpload {
            student_id,
            exam_id,
            file_name,
            doc,
        })
    }
}

fn stored_doc_name(file_name: &str, bytes: &[u8]) -> String {
    let ext: String = file_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let ext = if ext.is_empty() { "dat".to_string() } else { ext };
    let digest = hex::encode(Sha256::digest(bytes));
    format!("mark_sheets/{}.{}", &digest[..16], ext)
}

fn handle_upload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let params: UploadParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let upload = match params.validate() {
        Ok(v) => v,
        Err(reasons) => {
            return err_reasons(&req.id, "invalid_request", "invalid upload request", reasons)
        }
    };

    let student: Option<(i64, i64)> = match conn
        .query_row(
            "SELECT course_id, user_id FROM students WHERE id = ? AND is_active = 1",
            [upload.student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((course_id, user_id)) = student else {
        return err_reasons(
            &req.id,
            "invalid_request",
            "invalid upload request",
            vec!["student not found".to_string()],
        );
    };

    let exam_name: Option<String> = match conn
        .query_row(
            "SELECT exam_name FROM exams WHERE id = ? AND is_active = 1",
            [upload.exam_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(exam_name) = exam_name else {
        return err_reasons(
            &req.id,
            "invalid_request",
            "invalid upload request",
            vec!["choose an examination".to_string()],
        );
    };

    tracing::info!(
        student_id = upload.student_id,
        exam_id = upload.exam_id,
        file = %upload.file_name,
        "mark sheet upload"
    );

    let cfg = ingest::load_verify_config(conn);
    let rel_path = stored_doc_name(&upload.file_name, &upload.doc);
    let store_doc = |bytes: &[u8]| -> anyhow::Result<String> {
        let path: PathBuf = workspace.join(&rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(rel_path.clone())
    };

    let ingest_req = IngestRequest {
        actor_user_id: user_id,
        student_id: upload.student_id,
        course_id,
        exam_id: upload.exam_id,
        exam_name: &exam_name,
        file_name: &upload.file_name,
        doc: &upload.doc,
    };
    match ingest::ingest_mark_sheet(
        conn,
        &cfg,
        &ingest_req,
        |bytes| pdf::open_first_page(&upload.file_name, bytes),
        store_doc,
    ) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "docId": outcome.doc_id,
                "sgpa": outcome.sgpa,
                "status": STATUS_PENDING,
                "marksWritten": outcome.marks_written,
            }),
        ),
        Err(IngestError::Unexpected(e)) => {
            tracing::error!(
                student_id = upload.student_id,
                exam_id = upload.exam_id,
                error = ?e,
                "mark sheet ingestion failed"
            );
            err_reasons(
                &req.id,
                "unexpected",
                "something went wrong",
                vec!["something went wrong".to_string()],
            )
        }
        Err(e) => err_reasons(&req.id, e.code(), e.to_string(), vec![e.to_string()]),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marksheet.upload" => Some(handle_upload(state, req)),
        _ => None,
    }
}
