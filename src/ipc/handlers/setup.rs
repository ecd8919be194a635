use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::recap::{self, TrendLabels, DEFAULT_TOP_ABSENT_LIMIT};
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Attendance,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "attendance" => Some(Self::Attendance),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Attendance => "setup.attendance",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Attendance => json!({
            "topAbsentLimit": DEFAULT_TOP_ABSENT_LIMIT,
            "trendLocale": "id_ID",
            "trendLabelFormat": "%d %b",
            "confirmBulkOverwrite": true
        }),
    }
}

/// Typed view of the `attendance` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSetup {
    pub top_absent_limit: usize,
    pub trend_locale: String,
    pub trend_label_format: String,
    pub confirm_bulk_overwrite: bool,
}

impl AttendanceSetup {
    pub fn trend_labels(&self) -> TrendLabels {
        let defaults = TrendLabels::default();
        TrendLabels {
            locale: recap::parse_locale(&self.trend_locale).unwrap_or(defaults.locale),
            format: if recap::is_valid_label_format(&self.trend_label_format) {
                self.trend_label_format.clone()
            } else {
                defaults.format
            },
        }
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be between {} and {}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string", key))?;
    if s.chars().count() > max_len {
        return Err(format!("{} must be at most {} chars", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Attendance => match k.as_str() {
                "topAbsentLimit" => {
                    obj.insert(k.clone(), json!(parse_i64_range(v, k, 1, 50)?));
                }
                "trendLocale" => {
                    let s = parse_string_max(v, k, 16)?;
                    if recap::parse_locale(&s).is_none() {
                        return Err(format!("unsupported trendLocale: {}", s));
                    }
                    obj.insert(k.clone(), json!(s));
                }
                "trendLabelFormat" => {
                    let s = parse_string_max(v, k, 32)?;
                    if !recap::is_valid_label_format(&s) {
                        return Err("trendLabelFormat is not a valid date format".to_string());
                    }
                    obj.insert(k.clone(), json!(s));
                }
                "confirmBulkOverwrite" => {
                    obj.insert(k.clone(), json!(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown attendance field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

pub fn attendance_setup(conn: &rusqlite::Connection) -> anyhow::Result<AttendanceSetup> {
    let value = load_section(conn, SetupSection::Attendance)?;
    Ok(serde_json::from_value(value)?)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let attendance = match load_section(conn, SetupSection::Attendance) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "attendance": attendance }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
