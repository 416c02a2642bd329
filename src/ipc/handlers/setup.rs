//! Reference-data and roster glue: courses, exams, students, and the
//! dropdown listings. Thin create/read surface around the store; the
//! ingestion pipeline itself lives in `upload`.

use crate::db;
use crate::ipc::error::{err, err_reasons, ok};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::json;

use super::auth::{hash_password, ROLE_STUDENT};

/// Students created from the roster screen start with this password until
/// they change it.
const DEFAULT_STUDENT_PASSWORD: &str = "12345";

fn handle_name_create(
    state: &mut AppState,
    req: &Request,
    table: &str,
    column: &str,
    id_key: &str,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let now = db::now();
    let sql = format!(
        "INSERT INTO {table}({column}, is_active, created_time, modified_time) VALUES(?, 1, ?, ?)"
    );
    if let Err(e) = conn.execute(&sql, (&name, &now, &now)) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": table })),
        );
    }
    ok(&req.id, json!({ id_key: conn.last_insert_rowid(), "name": name }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StudentCreateParams {
    username: Option<String>,
    name: Option<String>,
    registration_no: Option<String>,
    course_id: Option<i64>,
}

struct ValidStudentCreate {
    username: String,
    name: String,
    registration_no: String,
    course_id: i64,
}

impl StudentCreateParams {
    /// Single validation pass; every problem is reported at once.
    fn validate(self) -> Result<ValidStudentCreate, Vec<String>> {
        let mut reasons = Vec::new();
        let username = self.username.unwrap_or_default().trim().to_string();
        if username.is_empty() {
            reasons.push("USERNAME: this field is required".to_string());
        }
        let name = self.name.unwrap_or_default().trim().to_string();
        if name.is_empty() {
            reasons.push("NAME: this field is required".to_string());
        }
        let registration_no = self.registration_no.unwrap_or_default().trim().to_string();
        if registration_no.is_empty() {
            reasons.push("REGISTRATION_NO: this field is required".to_string());
        }
        let course_id = match self.course_id {
            Some(id) if id > 0 => id,
            _ => {
                reasons.push("COURSE_ID: this field is required".to_string());
                0
            }
        };
        if !reasons.is_empty() {
            return Err(reasons);
        }
        Ok(ValidStudentCreate {
            username,
            name,
            registration_no,
            course_id,
        })
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let params: StudentCreateParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let valid = match params.validate() {
        Ok(v) => v,
        Err(reasons) => {
            return err_reasons(&req.id, "invalid_request", "invalid student data", reasons)
        }
    };

    let username_taken: bool = match conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)",
        [&valid.username],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if username_taken {
        return err(&req.id, "invalid_request", "username already exists", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let now = db::now();
    if let Err(e) = tx.execute(
        "INSERT INTO users(username, password_hash, name, role, is_active, created_time, modified_time)
         VALUES(?, ?, ?, ?, 1, ?, ?)",
        (
            &valid.username,
            hash_password(DEFAULT_STUDENT_PASSWORD),
            &valid.name,
            ROLE_STUDENT,
            &now,
            &now,
        ),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }
    let user_id = tx.last_insert_rowid();

    if let Err(e) = tx.execute(
        "INSERT INTO students(user_id, registration_no, course_id, is_active, created_time, modified_time)
         VALUES(?, ?, ?, 1, ?, ?)",
        (user_id, &valid.registration_no, valid.course_id, &now, &now),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    let student_id = tx.last_insert_rowid();

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "studentId": student_id, "userId": user_id }))
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "exams": [] }));
    };
    let mut stmt = match conn
        .prepare("SELECT id, exam_name FROM exams WHERE is_active = 1 ORDER BY id")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let exam_name: String = row.get(1)?;
            Ok(json!({ "id": id, "examName": exam_name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(exams) => ok(&req.id, json!({ "exams": exams })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(exam_id) = req.params.get("examId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing examId", None);
    };
    let course_id = req.params.get("courseId").and_then(|v| v.as_i64());

    let mut stmt = match conn.prepare(
        "SELECT id, subject_code, subject_name FROM subjects
         WHERE is_active = 1 AND exam_id = ?
           AND (?2 IS NULL OR course_id = ?2)
         ORDER BY id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((exam_id, course_id), |row| {
            let id: i64 = row.get(0)?;
            let code: Option<String> = row.get(1)?;
            let name: String = row.get(2)?;
            Ok(json!({ "id": id, "subjectCode": code, "subjectName": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    let course_id = req.params.get("courseId").and_then(|v| v.as_i64());

    let mut stmt = match conn.prepare(
        "SELECT s.id, u.name, s.registration_no FROM students s
         JOIN users u ON u.id = s.user_id
         WHERE s.is_active = 1 AND (?1 IS NULL OR s.course_id = ?1)
         ORDER BY s.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([course_id], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let registration_no: Option<String> = row.get(2)?;
            Ok(json!({ "id": id, "name": name, "registrationNo": registration_no }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.create" => Some(handle_name_create(state, req, "courses", "course_name", "courseId")),
        "exams.create" => Some(handle_name_create(state, req, "exams", "exam_name", "examId")),
        "students.create" => Some(handle_students_create(state, req)),
        "exams.list" => Some(handle_exams_list(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
