mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rollbook-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["workspacePath"], serde_json::Value::Null);

    let no_ws = request(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.dayOpen",
        json!({ "teacherId": "t1", "date": "2024-06-01" }),
    );
    assert_eq!(error_code(&no_ws), Some("no_workspace"));

    let unknown = request(&mut stdin, &mut reader, "3", "grades.list", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    let classes = request(&mut stdin, &mut reader, "3b", "classes.list", json!({}));
    assert_eq!(error_code(&classes), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.ensure",
        json!({ "teacherId": "t1", "fullName": "Bu Sari" }),
    );

    let methods = [
        ("6", "setup.get", json!({})),
        ("7", "classes.list", json!({})),
        ("8", "students.list", json!({ "teacherId": "t1" })),
        ("9", "attendance.dayOpen", json!({ "teacherId": "t1", "date": "2024-06-01" })),
        ("10", "attendance.monthOpen", json!({ "teacherId": "t1", "month": "2024-06" })),
        ("11", "attendance.topAbsentees", json!({ "teacherId": "t1", "month": "2024-06" })),
        ("12", "attendance.trend", json!({ "teacherId": "t1" })),
    ];
    for (id, method, params) in methods {
        let result = request_ok(&mut stdin, &mut reader, id, method, params);
        assert!(result.is_object(), "{} returned {}", method, result);
    }

    let numeric_today = request(
        &mut stdin,
        &mut reader,
        "12b",
        "attendance.trend",
        json!({ "teacherId": "t1", "today": 20240601 }),
    );
    assert_eq!(error_code(&numeric_today), Some("bad_params"));

    // A teacher with no class sees empty, zero-filled views rather than errors.
    let month = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "attendance.monthOpen",
        json!({ "teacherId": "t1", "month": "2024-06" }),
    );
    assert_eq!(month["tally"], json!({}));
    assert_eq!(month["topAbsentees"], json!([]));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(error_code(&value), Some("bad_json"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
