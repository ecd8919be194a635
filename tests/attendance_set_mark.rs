mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, seed_class, spawn_sidecar, temp_dir};

#[test]
fn set_mark_last_write_wins_and_day_recap_follows() {
    let workspace = temp_dir("rollbook-set-mark");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = seed_class(&mut stdin, &mut reader, &workspace, &["Ani", "Budi"]);
    let (a, b) = (ids[0].clone(), ids[1].clone());

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.dayOpen",
        json!({ "teacherId": "t1", "date": "2024-06-01" }),
    );
    assert_eq!(before["marks"], json!({}));
    assert_eq!(before["counts"]["unmarked"], 2);

    for (i, status) in ["Sakit", "unexcused", "present"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("2-{}", i),
            "attendance.setMark",
            json!({ "teacherId": "t1", "studentId": a, "date": "2024-06-01", "status": status }),
        );
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.setMark",
        json!({ "teacherId": "t1", "studentId": b, "date": "2024-06-01", "status": "sick" }),
    );

    let recap = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.dayOpen",
        json!({ "teacherId": "t1", "date": "2024-06-01" }),
    );
    let marks = recap["marks"].as_object().expect("marks object");
    assert_eq!(marks.len(), 2);
    assert_eq!(marks[&a], "present");
    assert_eq!(marks[&b], "sick");
    assert_eq!(recap["counts"]["present"], 1);
    assert_eq!(recap["counts"]["sick"], 1);
    assert_eq!(recap["counts"]["unmarked"], 0);
    let rows = recap["rows"].as_array().expect("rows");
    assert_eq!(rows[0]["name"], "Ani");
    assert_eq!(rows[0]["status"], "present");

    let month = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.monthOpen",
        json!({ "teacherId": "t1", "month": "2024-06" }),
    );
    // Three writes for one (student, date) still count once.
    assert_eq!(month["tally"][&a]["present"], 1);
    assert_eq!(month["tally"][&a]["unexcused"], 0);
    assert_eq!(month["tally"][&a]["sick"], 0);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn set_mark_validates_status_student_and_date() {
    let workspace = temp_dir("rollbook-set-mark-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = seed_class(&mut stdin, &mut reader, &workspace, &["Ani"]);

    let bad_status = request(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.setMark",
        json!({ "teacherId": "t1", "studentId": ids[0], "date": "2024-06-01", "status": "late" }),
    );
    assert_eq!(error_code(&bad_status), Some("bad_params"));

    let bad_date = request(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.setMark",
        json!({ "teacherId": "t1", "studentId": ids[0], "date": "01/06/2024", "status": "present" }),
    );
    assert_eq!(error_code(&bad_date), Some("bad_params"));

    let missing_student = request(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.setMark",
        json!({ "teacherId": "t1", "studentId": "nobody", "date": "2024-06-01", "status": "present" }),
    );
    assert_eq!(error_code(&missing_student), Some("not_found"));

    let missing_teacher = request(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.setMark",
        json!({ "teacherId": "t9", "studentId": ids[0], "date": "2024-06-01", "status": "present" }),
    );
    assert_eq!(error_code(&missing_teacher), Some("not_found"));

    let recap = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.dayOpen",
        json!({ "teacherId": "t1", "date": "2024-06-01" }),
    );
    assert_eq!(recap["marks"], json!({}));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn clear_mark_returns_student_to_unmarked() {
    let workspace = temp_dir("rollbook-clear-mark");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = seed_class(&mut stdin, &mut reader, &workspace, &["Ani"]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.setMark",
        json!({ "teacherId": "t1", "studentId": ids[0], "date": "2024-06-03", "status": "izin" }),
    );
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.clearMark",
        json!({ "teacherId": "t1", "studentId": ids[0], "date": "2024-06-03" }),
    );
    assert_eq!(cleared["removed"], true);

    let recap = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.dayOpen",
        json!({ "teacherId": "t1", "date": "2024-06-03" }),
    );
    assert_eq!(recap["rows"][0]["status"], serde_json::Value::Null);
    assert_eq!(recap["counts"]["unmarked"], 1);

    let _ = std::fs::remove_dir_all(workspace);
}
