mod test_support;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use marksheetd::ipc::AppState;
use serde_json::json;
use test_support::{open_text_workspace, request, request_ok, temp_workspace};

fn create_student(state: &mut AppState, username: &str, reg: &str) -> i64 {
    request_ok(
        state,
        "s",
        "students.create",
        json!({ "username": username, "name": username, "registrationNo": reg, "courseId": 1 }),
    )["studentId"]
        .as_i64()
        .expect("studentId")
}

fn upload(state: &mut AppState, student_id: i64, exam_id: i64) -> serde_json::Value {
    let text = "UNIVERSITY OF CALICUT\nI Semester B.Sc\n\n\
                Code  Course  Grade  GP  Cr  CP  Status\n\
                A01  Data Structures  A  9  4  36  Passed\n\
                A02  Operating Systems  B  8  4  32  Passed\n\
                \nSGPA summary\n";
    request(
        state,
        "up",
        "marksheet.upload",
        json!({
            "studentId": student_id,
            "examId": exam_id,
            "fileName": "sheet.txt",
            "docBase64": BASE64.encode(text),
        }),
    )
}

#[test]
fn same_subject_across_two_uploads_is_created_once() {
    let ws = temp_workspace("marksheetd-dedup");
    let mut state = open_text_workspace(&ws);
    request_ok(&mut state, "c", "courses.create", json!({ "name": "BSC" }));
    let exam_id = request_ok(&mut state, "e", "exams.create", json!({ "name": "Semester 1" }))["examId"]
        .as_i64()
        .expect("examId");

    let alice = create_student(&mut state, "alice", "R-1");
    let bob = create_student(&mut state, "bob", "R-2");

    let first = upload(&mut state, alice, exam_id);
    assert!(first["ok"].as_bool().unwrap_or(false), "alice upload: {first}");
    let second = upload(&mut state, bob, exam_id);
    assert!(second["ok"].as_bool().unwrap_or(false), "bob upload: {second}");

    let conn = state.db.as_ref().expect("db");
    let subjects: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM subjects WHERE subject_code = 'A01' AND subject_name = 'Data Structures'",
            [],
            |r| r.get(0),
        )
        .expect("subject count");
    assert_eq!(subjects, 1);

    let marks_for_a01: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM marks m
             JOIN subjects s ON s.id = m.subject_id
             WHERE s.subject_code = 'A01'",
            [],
            |r| r.get(0),
        )
        .expect("marks count");
    assert_eq!(marks_for_a01, 2);

    // Two distinct codes overall, both listed for the exam dropdown.
    let listed = request_ok(
        &mut state,
        "l",
        "subjects.list",
        json!({ "examId": exam_id, "courseId": 1 }),
    );
    assert_eq!(listed["subjects"].as_array().expect("subjects").len(), 2);

    let roster = request_ok(&mut state, "r", "students.list", json!({ "courseId": 1 }));
    let students = roster["students"].as_array().expect("students");
    assert_eq!(students.len(), 2);
    assert_eq!(students[0]["registrationNo"], "R-1");
}
