mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, seed_class, spawn_sidecar, temp_dir};

fn set(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    id: &str,
    student: &str,
    date: &str,
    status: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "attendance.setMark",
        json!({ "teacherId": "t1", "studentId": student, "date": date, "status": status }),
    );
}

#[test]
fn month_open_tallies_roster_within_calendar_month() {
    let workspace = temp_dir("rollbook-month-open");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = seed_class(&mut stdin, &mut reader, &workspace, &["Ani", "Budi", "Citra"]);
    let (a, b, c) = (&ids[0], &ids[1], &ids[2]);

    set(&mut stdin, &mut reader, "1", a, "2024-06-01", "present");
    set(&mut stdin, &mut reader, "2", a, "2024-06-02", "unexcused");
    set(&mut stdin, &mut reader, "3", b, "2024-06-01", "sick");
    // Outside June on both sides.
    set(&mut stdin, &mut reader, "4", a, "2024-05-31", "unexcused");
    set(&mut stdin, &mut reader, "5", b, "2024-07-01", "unexcused");

    let month = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.monthOpen",
        json!({ "teacherId": "t1", "month": "2024-06" }),
    );
    assert_eq!(month["startDate"], "2024-06-01");
    assert_eq!(month["endDate"], "2024-06-30");
    assert_eq!(
        month["tally"][a],
        json!({ "present": 1, "excusedLeave": 0, "sick": 0, "unexcused": 1 })
    );
    assert_eq!(
        month["tally"][b],
        json!({ "present": 0, "excusedLeave": 0, "sick": 1, "unexcused": 0 })
    );
    assert_eq!(
        month["tally"][c],
        json!({ "present": 0, "excusedLeave": 0, "sick": 0, "unexcused": 0 })
    );
    let top = month["topAbsentees"].as_array().expect("topAbsentees");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["studentId"], a.as_str());
    assert_eq!(top[0]["unexcused"], 1);

    // Cached tally must see later writes in the same month.
    set(&mut stdin, &mut reader, "7", c, "2024-06-30", "unexcused");
    set(&mut stdin, &mut reader, "8", c, "2024-06-29", "unexcused");
    let month = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.monthOpen",
        json!({ "teacherId": "t1", "month": "2024-06" }),
    );
    assert_eq!(month["tally"][c]["unexcused"], 2);
    let top = month["topAbsentees"].as_array().expect("topAbsentees");
    assert_eq!(top[0]["studentId"], c.as_str());
    assert_eq!(top[1]["studentId"], a.as_str());

    let feb = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.monthOpen",
        json!({ "teacherId": "t1", "month": "2024-02" }),
    );
    assert_eq!(feb["endDate"], "2024-02-29");
    assert_eq!(feb["topAbsentees"], json!([]));

    let bad = request(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.monthOpen",
        json!({ "teacherId": "t1", "month": "2024-13" }),
    );
    assert_eq!(error_code(&bad), Some("bad_params"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn top_absentees_respects_limit_and_setting() {
    let workspace = temp_dir("rollbook-top-absentees");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = seed_class(&mut stdin, &mut reader, &workspace, &["Ani", "Budi", "Citra", "Dewi"]);

    // Ani 1, Budi 3, Citra 1, Dewi 0.
    set(&mut stdin, &mut reader, "1", &ids[0], "2024-06-03", "alpa");
    set(&mut stdin, &mut reader, "2", &ids[1], "2024-06-03", "A");
    set(&mut stdin, &mut reader, "3", &ids[1], "2024-06-04", "unexcused");
    set(&mut stdin, &mut reader, "4", &ids[1], "2024-06-05", "unexcused");
    set(&mut stdin, &mut reader, "5", &ids[2], "2024-06-05", "unexcused");
    set(&mut stdin, &mut reader, "6", &ids[3], "2024-06-05", "present");

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.topAbsentees",
        json!({ "teacherId": "t1", "month": "2024-06" }),
    );
    assert_eq!(all["limit"], 7);
    let names: Vec<&str> = all["topAbsentees"]
        .as_array()
        .expect("list")
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Budi", "Ani", "Citra"]);

    let two = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.topAbsentees",
        json!({ "teacherId": "t1", "month": "2024-06", "limit": 2 }),
    );
    assert_eq!(two["topAbsentees"].as_array().map(|v| v.len()), Some(2));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "setup.update",
        json!({ "section": "attendance", "patch": { "topAbsentLimit": 1 } }),
    );
    let month = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.monthOpen",
        json!({ "teacherId": "t1", "month": "2024-06" }),
    );
    let top = month["topAbsentees"].as_array().expect("list");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["name"], "Budi");
    assert_eq!(top[0]["unexcused"], 3);

    let bad_limit = request(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.topAbsentees",
        json!({ "teacherId": "t1", "month": "2024-06", "limit": 0 }),
    );
    assert_eq!(error_code(&bad_limit), Some("bad_params"));

    let _ = std::fs::remove_dir_all(workspace);
}
