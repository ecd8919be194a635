use crate::cache::RecapCache;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::setup::{attendance_setup, AttendanceSetup};
use crate::ipc::helpers::{
    get_optional_string_list, get_required_date, get_required_month, get_required_status,
    get_required_str, parse_date,
};
use crate::ipc::types::{AppState, Request};
use crate::recap::{self, DailyRecap, MonthKey, MonthlyTally, TREND_DAYS};
use crate::store::{self, StoreError, Student, Teacher};
use crate::writer;
use chrono::{Days, Local};
use rusqlite::Connection;
use serde_json::json;
use tracing::debug;

fn load_setup(conn: &Connection) -> Result<AttendanceSetup, HandlerErr> {
    attendance_setup(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn daily_recap(
    conn: &Connection,
    recaps: &mut RecapCache,
    teacher: &Teacher,
    date: chrono::NaiveDate,
) -> Result<DailyRecap, HandlerErr> {
    if let Some(hit) = recaps.daily(&teacher.id, date) {
        debug!(teacher_id = %teacher.id, %date, "daily recap cache hit");
        return Ok(hit.clone());
    }
    let marks = store::marks_for_date(conn, &teacher.id, date)?;
    let recap = recap::build_daily_recap(date, &marks);
    recaps.put_daily(&teacher.id, date, recap.clone());
    Ok(recap)
}

fn monthly_tally(
    conn: &Connection,
    recaps: &mut RecapCache,
    teacher: &Teacher,
    roster: &[Student],
    month: MonthKey,
) -> Result<MonthlyTally, HandlerErr> {
    if let Some(hit) = recaps.monthly(&teacher.id, month) {
        debug!(teacher_id = %teacher.id, %month, "monthly tally cache hit");
        return Ok(hit.clone());
    }
    let marks = store::marks_in_range(conn, &teacher.id, month.first_day(), month.last_day())?;
    let tally = recap::build_monthly_tally(month, roster.iter().map(|s| s.id.as_str()), &marks);
    recaps.put_monthly(&teacher.id, month, tally.clone());
    Ok(tally)
}

fn attendance_set_mark(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let student_id = get_required_str(params, "studentId")?;
    let date = get_required_date(params, "date")?;
    let status = get_required_status(params)?;

    let mark_id = writer::set_mark(conn, &teacher_id, &student_id, date, status)?;
    recaps.invalidate_date(date);
    Ok(json!({
        "markId": mark_id,
        "studentId": student_id,
        "date": date,
        "status": status
    }))
}

fn attendance_clear_mark(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let student_id = get_required_str(params, "studentId")?;
    let date = get_required_date(params, "date")?;

    let removed = writer::clear_mark(conn, &teacher_id, &student_id, date)?;
    recaps.invalidate_date(date);
    Ok(json!({ "ok": true, "removed": removed }))
}

fn attendance_mark_all_present(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let date = get_required_date(params, "date")?;
    let student_ids = get_optional_string_list(params, "studentIds")?;

    let setup = load_setup(conn)?;
    let confirmed = params
        .get("confirm")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if setup.confirm_bulk_overwrite && !confirmed {
        return Err(HandlerErr::new(
            "confirm_required",
            "marking everyone present replaces all marks for this date; resend with confirm=true",
        ));
    }

    match writer::mark_all_present(conn, &teacher_id, date, student_ids) {
        Ok(outcome) => {
            recaps.invalidate_date(date);
            Ok(json!({
                "date": date,
                "written": outcome.written,
                "removed": outcome.removed,
                "failed": outcome.failed
            }))
        }
        Err(e @ StoreError::PartialFailure(_)) => {
            // The successful subset was committed.
            recaps.invalidate_date(date);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn attendance_day_open(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let date = get_required_date(params, "date")?;
    let teacher = store::require_teacher(conn, &teacher_id)?;
    let roster = store::roster_for_teacher(conn, &teacher)?;
    let recap = daily_recap(conn, recaps, &teacher, date)?;
    let (counts, unmarked) = recap::day_counts(&roster, &recap);

    let rows: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| {
            json!({
                "studentId": s.id,
                "name": s.name,
                "nis": s.nis,
                "photoUrl": s.photo_url,
                "status": recap.get(&s.id)
            })
        })
        .collect();

    Ok(json!({
        "date": date,
        "marks": recap,
        "rows": rows,
        "counts": {
            "present": counts.present,
            "excusedLeave": counts.excused_leave,
            "sick": counts.sick,
            "unexcused": counts.unexcused,
            "unmarked": unmarked
        }
    }))
}

fn resolve_limit(params: &serde_json::Value, setup: &AttendanceSetup) -> Result<usize, HandlerErr> {
    match params.get("limit") {
        None | Some(serde_json::Value::Null) => Ok(setup.top_absent_limit),
        Some(v) => match v.as_u64() {
            Some(n) if n >= 1 => Ok(n as usize),
            _ => Err(HandlerErr::bad_params("limit must be a positive integer")),
        },
    }
}

fn attendance_month_open(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let month = get_required_month(params)?;
    let setup = load_setup(conn)?;
    let teacher = store::require_teacher(conn, &teacher_id)?;
    let roster = store::roster_for_teacher(conn, &teacher)?;
    let tally = monthly_tally(conn, recaps, &teacher, &roster, month)?;
    let top = recap::top_absentees(&roster, &tally, setup.top_absent_limit);

    Ok(json!({
        "month": month.to_string(),
        "startDate": month.first_day(),
        "endDate": month.last_day(),
        "students": roster,
        "tally": tally,
        "topAbsentees": top
    }))
}

fn attendance_top_absentees(
    conn: &Connection,
    recaps: &mut RecapCache,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let month = get_required_month(params)?;
    let setup = load_setup(conn)?;
    let limit = resolve_limit(params, &setup)?;
    let teacher = store::require_teacher(conn, &teacher_id)?;
    let roster = store::roster_for_teacher(conn, &teacher)?;
    let tally = monthly_tally(conn, recaps, &teacher, &roster, month)?;

    Ok(json!({
        "month": month.to_string(),
        "limit": limit,
        "topAbsentees": recap::top_absentees(&roster, &tally, limit)
    }))
}

fn attendance_trend(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let today = match params.get("today") {
        None | Some(serde_json::Value::Null) => Local::now().date_naive(),
        Some(v) => parse_date(
            v.as_str()
                .ok_or_else(|| HandlerErr::bad_params("today must be YYYY-MM-DD"))?,
        )?,
    };
    let setup = load_setup(conn)?;
    let labels = setup.trend_labels();
    store::require_teacher(conn, &teacher_id)?;

    let from = today
        .checked_sub_days(Days::new(TREND_DAYS - 1))
        .ok_or_else(|| HandlerErr::bad_params("today is out of range"))?;
    let history = store::marks_in_range(conn, &teacher_id, from, today)?;
    let days = recap::build_trend(&history, today, |d| labels.label(d));

    Ok(json!({ "today": today, "days": days }))
}

fn handle_attendance_set_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_set_mark(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_clear_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_clear_mark(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_mark_all_present(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_mark_all_present(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_day_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_day_open(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_month_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_month_open(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_top_absentees(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_top_absentees(conn, &mut state.recaps, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_trend(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_trend(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.setMark" => Some(handle_attendance_set_mark(state, req)),
        "attendance.clearMark" => Some(handle_attendance_clear_mark(state, req)),
        "attendance.markAllPresent" => Some(handle_attendance_mark_all_present(state, req)),
        "attendance.dayOpen" => Some(handle_attendance_day_open(state, req)),
        "attendance.monthOpen" => Some(handle_attendance_month_open(state, req)),
        "attendance.topAbsentees" => Some(handle_attendance_top_absentees(state, req)),
        "attendance.trend" => Some(handle_attendance_trend(state, req)),
        _ => None,
    }
}
