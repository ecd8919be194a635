use crate::cache::RecapCache;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, Teacher};
use crate::writer;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn default_photo_url(name: &str) -> String {
    let encoded = name.split_whitespace().collect::<Vec<_>>().join("+");
    format!(
        "https://ui-avatars.com/api/?name={}&background=random",
        encoded
    )
}

fn require_class(teacher: &Teacher) -> Result<&str, HandlerErr> {
    teacher
        .class_id
        .as_deref()
        .ok_or_else(|| HandlerErr::new("no_class", "link the teacher to a class first"))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let teacher = store::require_teacher(conn, &teacher_id)?;
    let students = store::roster_for_teacher(conn, &teacher)?;
    Ok(json!({
        "classId": teacher.class_id,
        "className": teacher.class_name,
        "students": students
    }))
}

fn students_create(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let name = get_required_str(params, "name")?;
    let nis = get_optional_str(params, "nis")?;
    let teacher = store::require_teacher(conn, &teacher_id)?;
    let class_id = require_class(&teacher)?;

    let student_id = store::insert_student(conn, class_id, &name, nis.as_deref(), &default_photo_url(&name))?;
    recaps.invalidate_monthly();
    info!(teacher_id = %teacher_id, student_id = %student_id, "student enrolled");
    Ok(json!({ "studentId": student_id }))
}

fn students_update(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let student_id = get_required_str(params, "studentId")?;
    let teacher = store::require_teacher(conn, &teacher_id)?;
    let class_id = require_class(&teacher)?;
    let Some(current) = store::get_student(conn, class_id, &student_id)? else {
        return Err(HandlerErr::new("not_found", "student not found"));
    };

    let name = match params.get("name") {
        None => current.name,
        Some(_) => get_optional_str(params, "name")?
            .ok_or_else(|| HandlerErr::bad_params("name must not be empty"))?,
    };
    let nis = if params.get("nis").is_some() {
        get_optional_str(params, "nis")?
    } else {
        current.nis
    };

    store::update_student(conn, &student_id, &name, nis.as_deref())?;
    recaps.invalidate_monthly();
    Ok(json!({ "ok": true }))
}

fn students_delete(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let student_id = get_required_str(params, "studentId")?;
    let marks_removed = writer::delete_student(conn, &teacher_id, &student_id)?;
    recaps.invalidate_all();
    Ok(json!({ "ok": true, "marksRemoved": marks_removed }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_create(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_update(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_delete(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
