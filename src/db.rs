use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("marksheet.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Every entity table carries the same record-keeping columns: integer
/// surrogate key, `is_active` soft-delete flag, created/modified timestamps
/// and an `added_by` attribution (nullable so the first admin can bootstrap).
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            role INTEGER NOT NULL DEFAULT 3,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_time TEXT NOT NULL,
            modified_time TEXT NOT NULL,
            added_by INTEGER REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS auth_tokens(
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            key TEXT NOT NULL,
            is_expired INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_time TEXT NOT NULL,
            modified_time TEXT NOT NULL,
            added_by INTEGER REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_auth_tokens_user ON auth_tokens(user_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_auth_tokens_key ON auth_tokens(key)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY,
            course_name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_time TEXT NOT NULL,
            modified_time TEXT NOT NULL,
            added_by INTEGER REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id INTEGER PRIMARY KEY,
            exam_name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_time TEXT NOT NULL,
            modified_time TEXT NOT NULL,
            added_by INTEGER REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            registration_no TEXT,
            course_id INTEGER NOT NULL REFERENCES courses(id),
            is_active INTEGER NOT NULL DEFAULT 1,
            created_time TEXT NOT NULL,
            modified_time TEXT NOT NULL,
            added_by INTEGER REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course ON students(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY,
            subject_code TEXT,
            subject_name TEXT NOT NULL,
            course_id INTEGER NOT NULL REFERENCES courses(id),
            exam_id INTEGER NOT NULL REFERENCES exams(id),
            is_active INTEGER NOT NULL DEFAULT 1,
            created_time TEXT NOT NULL,
            modified_time TEXT NOT NULL,
            added_by INTEGER REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_code_name ON subjects(subject_code, subject_name)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_exam ON subjects(exam_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id INTEGER PRIMARY KEY,
            student_id INTEGER NOT NULL REFERENCES students(id),
            subject_id INTEGER NOT NULL REFERENCES subjects(id),
            exam_id INTEGER NOT NULL REFERENCES exams(id),
            grade TEXT,
            grade_point INTEGER,
            credit INTEGER,
            credit_point INTEGER,
            status TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_time TEXT NOT NULL,
            modified_time TEXT NOT NULL,
            added_by INTEGER REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student_exam ON marks(student_id, exam_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_subject ON marks(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mark_sheet_docs(
            id INTEGER PRIMARY KEY,
            student_id INTEGER NOT NULL REFERENCES students(id),
            exam_id INTEGER NOT NULL REFERENCES exams(id),
            doc_path TEXT NOT NULL,
            sgpa REAL,
            status TEXT NOT NULL DEFAULT 'Pending',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_time TEXT NOT NULL,
            modified_time TEXT NOT NULL,
            added_by INTEGER REFERENCES users(id)
        )",
        [],
    )?;
    // One active upload per (student, exam). Serializes racing ingestions at
    // commit time; a conflict surfaces as the duplicate-upload rejection.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_mark_sheet_docs_active
         ON mark_sheet_docs(student_id, exam_id) WHERE is_active = 1",
        [],
    )?;

    Ok(())
}

pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}
