use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn teachers_ensure(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let email = get_optional_str(params, "email")?;
    let full_name = get_optional_str(params, "fullName")?;

    if let Some(existing) = store::get_teacher(conn, &teacher_id)? {
        return Ok(json!({ "teacher": existing, "created": false }));
    }

    // Same fallback the sign-up flow used: the mailbox name, then the id.
    let full_name = full_name
        .or_else(|| {
            email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| teacher_id.clone());
    store::insert_teacher(conn, &teacher_id, &full_name, email.as_deref())?;
    info!(teacher_id = %teacher_id, "teacher profile created");

    let teacher = store::require_teacher(conn, &teacher_id)?;
    Ok(json!({ "teacher": teacher, "created": true }))
}

fn teachers_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let teacher = store::require_teacher(conn, &teacher_id)?;
    Ok(json!({ "teacher": teacher }))
}

fn handle_teachers_ensure(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match teachers_ensure(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_teachers_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match teachers_get(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.ensure" => Some(handle_teachers_ensure(state, req)),
        "teachers.get" => Some(handle_teachers_get(state, req)),
        _ => None,
    }
}
