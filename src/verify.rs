//! Mark-sheet authenticity verification: institution marker, SGPA marker,
//! declared-semester match, and table shape. Pure checks over the extracted
//! page; the caller decides what to do with the returned table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pdf::{PageLayer, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyConfig {
    pub institution_marker: String,
    pub sheet_marker: String,
    /// Inclusive bounds on extracted row count, header included. Deployed
    /// sheets have disagreed on the upper bound (9 vs 10), so it is settings
    /// data, not a constant.
    pub min_rows: usize,
    pub max_rows: usize,
    pub expected_extension: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            institution_marker: "UNIVERSITY OF CALICUT".to_string(),
            sheet_marker: "SGPA".to_string(),
            min_rows: 3,
            max_rows: 9,
            expected_extension: "pdf".to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("document is not an authentic mark sheet for this institution")]
    NotAuthentic,
    #[error("document has no SGPA summary")]
    NotAMarkSheet,
    #[error("exam and result mismatch")]
    ExamMismatch,
    #[error("mark table has {rows} rows, expected between {min} and {max}")]
    MalformedTable { rows: usize, min: usize, max: usize },
}

/// Exam display names map onto the roman-numeral semester phrase printed on
/// the sheet. Unmapped exam names always match.
fn semester_phrase(exam_name: &str) -> Option<&'static str> {
    match exam_name {
        "Semester 1" => Some("I Semester"),
        "Semester 2" => Some("II Semester"),
        "Semester 3" => Some("III Semester"),
        "Semester 4" => Some("IV Semester"),
        "Semester 5" => Some("V Semester"),
        "Semester 6" => Some("VI Semester"),
        _ => None,
    }
}

/// True when the page declares exactly this semester phrase. A plain
/// substring search would accept "II Semester" inside "III Semester", so an
/// occurrence only counts when it is not preceded by another numeral letter.
fn page_declares_semester(text: &str, phrase: &str) -> bool {
    let mut from = 0;
    while let Some(pos) = text[from..].find(phrase) {
        let at = from + pos;
        let preceding = text[..at].chars().next_back();
        if !matches!(preceding, Some('I') | Some('V') | Some('X')) {
            return true;
        }
        from = at + 1;
    }
    false
}

pub fn verify_mark_sheet(
    page: &impl PageLayer,
    exam_name: &str,
    cfg: &VerifyConfig,
) -> Result<Table, VerifyError> {
    if !page.search(&cfg.institution_marker) {
        return Err(VerifyError::NotAuthentic);
    }
    if !page.search(&cfg.sheet_marker) {
        return Err(VerifyError::NotAMarkSheet);
    }
    if let Some(phrase) = semester_phrase(exam_name) {
        if !page_declares_semester(page.text(), phrase) {
            return Err(VerifyError::ExamMismatch);
        }
    }

    let Some(table) = page.extract_table() else {
        return Err(VerifyError::MalformedTable {
            rows: 0,
            min: cfg.min_rows,
            max: cfg.max_rows,
        });
    };
    if table.len() < cfg.min_rows || table.len() > cfg.max_rows {
        return Err(VerifyError::MalformedTable {
            rows: table.len(),
            min: cfg.min_rows,
            max: cfg.max_rows,
        });
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::TextPage;

    fn sheet(header: &str, subject_lines: usize) -> TextPage {
        let mut text = format!("{header}\n\nCode  Course  Grade  GP  Cr  CP  Status\n");
        for i in 0..subject_lines {
            text.push_str(&format!("C{i}  Subject {i}  A  9  4  36  Passed\n"));
        }
        TextPage::new(text)
    }

    #[test]
    fn accepts_matching_sheet() {
        let page = sheet("UNIVERSITY OF CALICUT  III Semester  SGPA", 3);
        let table = verify_mark_sheet(&page, "Semester 3", &VerifyConfig::default()).expect("ok");
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn rejects_missing_markers_in_order() {
        let cfg = VerifyConfig::default();
        let page = sheet("SOMEWHERE ELSE  III Semester  SGPA", 3);
        assert_eq!(
            verify_mark_sheet(&page, "Semester 3", &cfg),
            Err(VerifyError::NotAuthentic)
        );
        let page = sheet("UNIVERSITY OF CALICUT  III Semester", 3);
        assert_eq!(
            verify_mark_sheet(&page, "Semester 3", &cfg),
            Err(VerifyError::NotAMarkSheet)
        );
    }

    #[test]
    fn third_semester_sheet_does_not_pass_for_semester_two() {
        let page = sheet("UNIVERSITY OF CALICUT  III Semester  SGPA", 3);
        assert_eq!(
            verify_mark_sheet(&page, "Semester 2", &VerifyConfig::default()),
            Err(VerifyError::ExamMismatch)
        );
    }

    #[test]
    fn unmapped_exam_name_always_matches() {
        let page = sheet("UNIVERSITY OF CALICUT  III Semester  SGPA", 3);
        assert!(verify_mark_sheet(&page, "Supplementary 2024", &VerifyConfig::default()).is_ok());
    }

    #[test]
    fn row_bounds_are_inclusive_and_configurable() {
        let cfg = VerifyConfig::default();
        let header = "UNIVERSITY OF CALICUT  III Semester  SGPA";

        // 2 rows (header + 1) is under the default minimum of 3.
        let small = sheet(header, 1);
        assert!(matches!(
            verify_mark_sheet(&small, "Semester 3", &cfg),
            Err(VerifyError::MalformedTable { rows: 2, .. })
        ));

        // header + 9 subjects = 10 rows: over the default bound, fine when raised.
        let big = sheet(header, 9);
        assert!(matches!(
            verify_mark_sheet(&big, "Semester 3", &cfg),
            Err(VerifyError::MalformedTable { rows: 10, .. })
        ));
        let wider = VerifyConfig {
            max_rows: 10,
            ..VerifyConfig::default()
        };
        assert!(verify_mark_sheet(&big, "Semester 3", &wider).is_ok());
    }

    #[test]
    fn pageless_table_is_malformed() {
        let page = TextPage::new("UNIVERSITY OF CALICUT III Semester SGPA prose only\n");
        assert!(matches!(
            verify_mark_sheet(&page, "Semester 3", &VerifyConfig::default()),
            Err(VerifyError::MalformedTable { rows: 0, .. })
        ));
    }
}
