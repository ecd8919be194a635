use chrono::NaiveDate;

use crate::ipc::error::HandlerErr;
use crate::recap::{MonthKey, Status};

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Absent, null and blank all read as `None`.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key)))?;
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(&get_required_str(params, key)?)
}

pub fn get_required_month(params: &serde_json::Value) -> Result<MonthKey, HandlerErr> {
    let raw = get_required_str(params, "month")?;
    MonthKey::parse(&raw).ok_or_else(|| HandlerErr::bad_params("month must be YYYY-MM"))
}

pub fn get_required_status(params: &serde_json::Value) -> Result<Status, HandlerErr> {
    let raw = get_required_str(params, "status")?;
    Status::parse(&raw).ok_or_else(|| HandlerErr::bad_params(format!("unknown status: {}", raw)))
}

pub fn get_optional_string_list(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    let Some(arr) = v.as_array() else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    arr.iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("{}[{}] must be a string", key, i)))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
