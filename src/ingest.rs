//! The mark-sheet ingestion transaction: duplicate-upload guard, request
//! gates, document verification, row-by-row normalization and aggregation,
//! lazy subject resolution, and a single atomic commit of every mark row
//! plus one summary row.

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

use crate::calc::{self, NormalizeError, SubjectResult, Totals};
use crate::db;
use crate::pdf::PageLayer;
use crate::verify::{self, VerifyConfig, VerifyError};

pub const VERIFY_SETTINGS_KEY: &str = "ingest.verify";

/// Field constraints mirrored from the relational model.
pub const MAX_SUBJECT_FIELD_LEN: usize = 255;
pub const MAX_GRADE_LEN: usize = 10;

pub const STATUS_PENDING: &str = "Pending";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("invalid file type")]
    InvalidFileType,
    #[error("marks for this exam have already been uploaded")]
    AlreadyUploaded,
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Row(#[from] NormalizeError),
    #[error("{0}")]
    Validation(String),
    /// Internal faults. Logged in full server-side; callers only ever see a
    /// generic message.
    #[error("something went wrong")]
    Unexpected(#[source] anyhow::Error),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::InvalidRequest(_) => "invalid_request",
            IngestError::InvalidFileType => "invalid_file_type",
            IngestError::AlreadyUploaded => "already_uploaded",
            IngestError::Verify(VerifyError::NotAuthentic) => "not_authentic",
            IngestError::Verify(VerifyError::NotAMarkSheet) => "not_a_mark_sheet",
            IngestError::Verify(VerifyError::ExamMismatch) => "exam_mismatch",
            IngestError::Verify(VerifyError::MalformedTable { .. }) => "malformed_table",
            IngestError::Row(_) => "malformed_row",
            IngestError::Validation(_) => "validation_failed",
            IngestError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(e: rusqlite::Error) -> Self {
        // A unique-index conflict on the active (student, exam) summary is
        // the idempotency guard firing under a race, not an internal fault.
        if let rusqlite::Error::SqliteFailure(f, _) = &e {
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                return IngestError::AlreadyUploaded;
            }
        }
        IngestError::Unexpected(e.into())
    }
}

pub struct IngestRequest<'a> {
    pub actor_user_id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub exam_id: i64,
    pub exam_name: &'a str,
    pub file_name: &'a str,
    pub doc: &'a [u8],
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub doc_id: i64,
    pub sgpa: f64,
    pub marks_written: usize,
}

pub fn load_verify_config(conn: &Connection) -> VerifyConfig {
    match db::settings_get_json(conn, VERIFY_SETTINGS_KEY) {
        Ok(Some(v)) => serde_json::from_value(v).unwrap_or_default(),
        _ => VerifyConfig::default(),
    }
}

fn has_active_upload(
    conn: &Connection,
    student_id: i64,
    exam_id: i64,
) -> Result<bool, IngestError> {
    let hits: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM marks
                       WHERE student_id = ? AND exam_id = ? AND is_active = 1)
              + EXISTS(SELECT 1 FROM mark_sheet_docs
                       WHERE student_id = ? AND exam_id = ? AND is_active = 1)",
        (student_id, exam_id, student_id, exam_id),
        |r| r.get(0),
    )?;
    Ok(hits > 0)
}

/// Resolves a (code, name) pair to an active subject, creating one on first
/// sight. The dedup key is (code, name) only; course and exam are recorded
/// as attribution on create and never reconciled against an existing match.
pub fn resolve_subject(
    conn: &Connection,
    code: &str,
    name: &str,
    course_id: i64,
    exam_id: i64,
    actor_user_id: i64,
) -> Result<i64, IngestError> {
    if code.len() > MAX_SUBJECT_FIELD_LEN || name.len() > MAX_SUBJECT_FIELD_LEN {
        return Err(IngestError::Validation(format!(
            "subject code/name longer than {MAX_SUBJECT_FIELD_LEN} characters"
        )));
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM subjects
             WHERE subject_code = ? AND subject_name = ? AND is_active = 1
             ORDER BY id LIMIT 1",
            (code, name),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let now = db::now();
    conn.execute(
        "INSERT INTO subjects(subject_code, subject_name, course_id, exam_id,
                              is_active, created_time, modified_time, added_by)
         VALUES(?, ?, ?, ?, 1, ?, ?, ?)",
        (code, name, course_id, exam_id, &now, &now, actor_user_id),
    )?;
    Ok(conn.last_insert_rowid())
}

/// Runs the whole ingestion as one all-or-nothing unit.
///
/// `open_page` turns the raw document into its first-page text layer and is
/// only invoked once the cheap gates have passed; `store_doc` persists the
/// original document and returns its stored path, and runs only after every
/// row has been accepted.
pub fn ingest_mark_sheet<P: PageLayer>(
    conn: &Connection,
    cfg: &VerifyConfig,
    req: &IngestRequest<'_>,
    open_page: impl FnOnce(&[u8]) -> anyhow::Result<P>,
    store_doc: impl FnOnce(&[u8]) -> anyhow::Result<String>,
) -> Result<IngestOutcome, IngestError> {
    // Gate 1: one upload per (student, exam), checked before any extraction.
    if has_active_upload(conn, req.student_id, req.exam_id)? {
        return Err(IngestError::AlreadyUploaded);
    }

    // Gate 2: request shape.
    if req.doc.is_empty() {
        return Err(IngestError::InvalidRequest("choose a file to upload".into()));
    }

    // Gate 3: expected document type, by extension. A name without a dot
    // compares its whole self and fails.
    let ext = req.file_name.rsplit('.').next().unwrap_or("");
    if ext != cfg.expected_extension {
        return Err(IngestError::InvalidFileType);
    }

    // Gate 4: open and verify; verification reasons propagate unchanged.
    let page = open_page(req.doc).map_err(IngestError::Unexpected)?;
    let table = verify::verify_mark_sheet(&page, req.exam_name, cfg)?;

    // Steps 5-7 share one transaction; dropping it on any early return rolls
    // back every subject, mark, and summary write at once.
    let tx = conn.unchecked_transaction().map_err(IngestError::from)?;

    let mut totals = Totals::default();
    let mut staged: Vec<(i64, SubjectResult)> = Vec::new();
    for (i, raw) in table.iter().enumerate().skip(1) {
        let mut row = calc::normalize_row(i, raw)?;
        totals.absorb(&mut row);
        if row.grade.len() > MAX_GRADE_LEN {
            return Err(IngestError::Validation(format!(
                "grade longer than {MAX_GRADE_LEN} characters"
            )));
        }
        let subject_id = resolve_subject(
            &tx,
            &row.subject_code,
            &row.subject_name,
            req.course_id,
            req.exam_id,
            req.actor_user_id,
        )?;
        staged.push((subject_id, row));
    }

    let sgpa = calc::sgpa(&totals);
    let now = db::now();
    for (subject_id, row) in &staged {
        tx.execute(
            "INSERT INTO marks(student_id, subject_id, exam_id, grade, grade_point,
                               credit, credit_point, status, is_active,
                               created_time, modified_time, added_by)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
            (
                req.student_id,
                subject_id,
                req.exam_id,
                &row.grade,
                row.grade_point,
                row.credit,
                row.credit_point,
                row.status.as_str(),
                &now,
                &now,
                req.actor_user_id,
            ),
        )?;
    }

    let doc_path = store_doc(req.doc).map_err(IngestError::Unexpected)?;
    tx.execute(
        "INSERT INTO mark_sheet_docs(student_id, exam_id, doc_path, sgpa, status,
                                     is_active, created_time, modified_time, added_by)
         VALUES(?, ?, ?, ?, ?, 1, ?, ?, ?)",
        (
            req.student_id,
            req.exam_id,
            &doc_path,
            sgpa,
            STATUS_PENDING,
            &now,
            &now,
            req.actor_user_id,
        ),
    )?;
    let doc_id = tx.last_insert_rowid();
    tx.commit().map_err(IngestError::from)?;

    Ok(IngestOutcome {
        doc_id,
        sgpa,
        marks_written: staged.len(),
    })
}
