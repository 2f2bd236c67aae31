//! Decoding of API JSON payloads into store records.
//!
//! The raw document is kept verbatim; only the fields the engine needs
//! (id, photo URL, creation time, counters) are lifted out.

use serde_json::Value;

use super::ApiError;
use crate::state::{StatusRecord, UserRecord};

/// Read an id that the API may send either as a number or a numeric string.
fn parse_sid(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The ordering key of a status. Fanfou's `id` is usually an opaque token
/// and the numeric sequence lives in `rawid`; a numeric `id` is used as-is.
fn status_sid(raw: &Value) -> Option<i64> {
    parse_sid(&raw["id"]).or_else(|| parse_sid(&raw["rawid"]))
}

pub fn status_from_json(raw: Value) -> Result<StatusRecord, ApiError> {
    let sid = status_sid(&raw).ok_or_else(|| {
        ApiError::Decode(format!(
            "status without numeric id or rawid: {}",
            raw["id"]
        ))
    })?;
    let photo_url = raw["photo"]["largeurl"]
        .as_str()
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    let created_at = raw["created_at"].as_str().map(str::to_string);
    Ok(StatusRecord {
        sid,
        created_at,
        photo_url,
        raw,
    })
}

pub fn user_from_json(raw: Value) -> Result<UserRecord, ApiError> {
    let id = match &raw["id"] {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(ApiError::Decode(format!("user without id: {}", other))),
    };
    Ok(UserRecord {
        id,
        screen_name: raw["screen_name"].as_str().map(str::to_string),
        statuses_count: raw["statuses_count"].as_u64(),
        friends_count: raw["friends_count"].as_u64(),
        raw,
    })
}

/// Decode a JSON array with `item`, rejecting any other shape.
///
/// A single record that fails to decode is logged and left out; one bad
/// entry must not block every later page behind it.
pub fn list_from_json<T>(
    value: Value,
    item: impl Fn(Value) -> Result<T, ApiError>,
) -> Result<Vec<T>, ApiError> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|raw| match item(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping record: {}", e);
                    None
                }
            })
            .collect()),
        other => Err(ApiError::Decode(format!(
            "expected a JSON array, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
