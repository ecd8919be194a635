use crate::cache::RecapCache;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn classes_link(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let grade_level = get_required_str(params, "gradeLevel")?;
    let section = get_required_str(params, "section")?;
    let display_name = format!("{}{}", grade_level, section);

    store::require_teacher(conn, &teacher_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let (class_id, created) = match store::find_class_id(&tx, &display_name)? {
        Some(id) => (id, false),
        None => (store::insert_class(&tx, &grade_level, &section, &display_name)?, true),
    };
    store::link_teacher_class(&tx, &teacher_id, &class_id)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    recaps.invalidate_monthly();
    info!(teacher_id = %teacher_id, class = %display_name, created, "teacher linked to class");
    Ok(json!({
        "classId": class_id,
        "displayName": display_name,
        "created": created
    }))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match store::list_classes(conn) {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_classes_link(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match classes_link(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.link" => Some(handle_classes_link(state, req)),
        _ => None,
    }
}
