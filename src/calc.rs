//! Row normalization and SGPA aggregation. Everything here is a pure
//! function over already-extracted table data; persistence happens in
//! `ingest`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkStatus {
    Passed,
    Failed,
}

impl MarkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkStatus::Passed => "Passed",
            MarkStatus::Failed => "Failed",
        }
    }
}

/// One normalized mark-sheet line. `contributes` is false for audit-style
/// rows whose credit_point column holds the "--" sentinel; those keep their
/// grade string but carry zero credit into the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectResult {
    pub subject_code: String,
    pub subject_name: String,
    pub grade: String,
    pub grade_point: i64,
    pub credit: i64,
    pub credit_point: i64,
    pub status: MarkStatus,
    pub contributes: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("row {row}: missing {field}")]
    MissingField { row: usize, field: &'static str },
    #[error("row {row}: {field} is not a number: {value:?}")]
    BadNumber {
        row: usize,
        field: &'static str,
        value: String,
    },
}

fn field<'a>(
    raw: &'a [Option<String>],
    row: usize,
    idx: usize,
    name: &'static str,
) -> Result<&'a str, NormalizeError> {
    let cell = raw
        .get(idx)
        .and_then(|c| c.as_deref())
        .map(str::trim)
        .unwrap_or("");
    if cell.is_empty() {
        return Err(NormalizeError::MissingField { row, field: name });
    }
    Ok(cell)
}

fn int_field(
    raw: &[Option<String>],
    row: usize,
    idx: usize,
    name: &'static str,
) -> Result<i64, NormalizeError> {
    let cell = field(raw, row, idx, name)?;
    cell.parse().map_err(|_| NormalizeError::BadNumber {
        row,
        field: name,
        value: cell.to_string(),
    })
}

/// Normalizes one post-header row. `row` is the 0-based index within the
/// extracted table, used only for error reporting.
pub fn normalize_row(row: usize, raw: &[Option<String>]) -> Result<SubjectResult, NormalizeError> {
    let subject_code = field(raw, row, 0, "subject_code")?.to_string();
    let subject_name = field(raw, row, 1, "subject_name")?.to_string();
    let grade = field(raw, row, 2, "grade")?.to_string();
    let status_text = field(raw, row, 6, "status")?;
    let status = if status_text == "Failed" {
        MarkStatus::Failed
    } else {
        MarkStatus::Passed
    };

    // A non-numeric credit_point marks a non-contributing subject: the grade
    // string is kept, the numeric columns are zeroed without complaint.
    let credit_point_cell = field(raw, row, 5, "credit_point")?;
    let (grade_point, credit, credit_point, contributes) =
        match credit_point_cell.parse::<i64>() {
            Ok(credit_point) => (
                int_field(raw, row, 3, "grade_point")?,
                int_field(raw, row, 4, "credit")?,
                credit_point,
                true,
            ),
            Err(_) => (0, 0, 0, false),
        };

    Ok(SubjectResult {
        subject_code,
        subject_name,
        grade,
        grade_point,
        credit,
        credit_point,
        status,
        contributes,
    })
}

/// Running aggregate, threaded explicitly through the row loop. `failed` is
/// sticky: once any row reports Failed, that row and every later row is
/// zeroed (in the stored record and in the totals); rows before the first
/// failure keep full credit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub total_credit: i64,
    pub total_credit_point: i64,
    pub failed: bool,
}

impl Totals {
    pub fn absorb(&mut self, row: &mut SubjectResult) {
        if row.status == MarkStatus::Failed {
            self.failed = true;
        }
        if self.failed || !row.contributes {
            row.grade_point = 0;
            row.credit = 0;
            row.credit_point = 0;
        } else {
            self.total_credit += row.credit;
            self.total_credit_point += row.credit_point;
        }
    }
}

/// Half-up rounding to 2 decimal places.
pub fn round_2dp(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Final SGPA: credit-weighted ratio rounded to 2 decimals, forced to 0 when
/// nothing contributed (division guard) or when any row failed.
pub fn sgpa(totals: &Totals) -> f64 {
    if totals.failed || totals.total_credit == 0 {
        return 0.0;
    }
    round_2dp(totals.total_credit_point as f64 / totals.total_credit as f64)
}
