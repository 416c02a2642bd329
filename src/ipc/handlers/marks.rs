//! Read side of a completed ingestion, plus the administrative approval
//! toggle on the summary row.

use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_marks_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(exam_id) = req.params.get("examId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing examId", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT m.id, m.grade, m.grade_point, m.credit, m.credit_point, m.status,
                sub.subject_code, sub.subject_name
         FROM marks m
         JOIN subjects sub ON sub.id = m.subject_id
         WHERE m.student_id = ? AND m.exam_id = ? AND m.is_active = 1
         ORDER BY m.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((student_id, exam_id), |row| {
            let id: i64 = row.get(0)?;
            let grade: Option<String> = row.get(1)?;
            let grade_point: Option<i64> = row.get(2)?;
            let credit: Option<i64> = row.get(3)?;
            let credit_point: Option<i64> = row.get(4)?;
            let status: Option<String> = row.get(5)?;
            let subject_code: Option<String> = row.get(6)?;
            let subject_name: String = row.get(7)?;
            Ok(json!({
                "id": id,
                "grade": grade,
                "gradePoint": grade_point,
                "credit": credit,
                "creditPoint": credit_point,
                "status": status,
                "subjectCode": subject_code,
                "subjectName": subject_name,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let marks = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Summary is absent when nothing was ever ingested for this pair.
    let summary: Option<(f64, String)> = match conn
        .query_row(
            "SELECT sgpa, status FROM mark_sheet_docs
             WHERE student_id = ? AND exam_id = ? AND is_active = 1",
            (student_id, exam_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let (sgpa, status) = match summary {
        Some((s, st)) => (Some(s), Some(st)),
        None => (None, None),
    };
    ok(
        &req.id,
        json!({ "marks": marks, "sgpa": sgpa, "status": status }),
    )
}

fn handle_marksheet_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(exam_id) = req.params.get("examId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing examId", None);
    };
    let status = match req.params.get("status").and_then(|v| v.as_str()) {
        Some(s @ ("Approved" | "Rejected")) => s,
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                format!("status must be Approved or Rejected, got {other:?}"),
                None,
            )
        }
        None => return err(&req.id, "bad_params", "missing status", None),
    };

    let updated = match conn.execute(
        "UPDATE mark_sheet_docs SET status = ?, modified_time = ?
         WHERE student_id = ? AND exam_id = ? AND is_active = 1",
        (status, db::now(), student_id, exam_id),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if updated == 0 {
        return err(&req.id, "not_found", "no mark sheet for this student and exam", None);
    }
    ok(&req.id, json!({ "status": status }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.view" => Some(handle_marks_view(state, req)),
        "marksheet.status" => Some(handle_marksheet_status(state, req)),
        _ => None,
    }
}
