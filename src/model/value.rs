//! Scalar helpers shared by the canonical model, the builder and the projector.
//!
//! This module contains:
//! - `NumOrStr`, the value type of numeric-looking fields
//! - Coercion of form strings into numbers, placeholders, or nothing
//! - List splitting for comma/newline separated form fields
//! - Lenient readers used when projecting foreign JSON

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

// ============================================================================
// Numeric Or Placeholder
// ============================================================================

/// A numeric field: a JSON number, or a string kept verbatim when it is an
/// environment placeholder such as `${PORT}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum NumOrStr {
    Num(i64),
    Str(String),
}

impl fmt::Display for NumOrStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumOrStr::Num(n) => write!(f, "{}", n),
            NumOrStr::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for NumOrStr {
    fn from(n: i64) -> Self {
        NumOrStr::Num(n)
    }
}

/// Returns `true` for `$NAME` / `${NAME}` environment placeholders
pub fn is_placeholder(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('$') else {
        return false;
    };
    let name = rest
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(rest);
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Coerces a numeric-looking form string.
///
/// Integers become numbers, placeholders stay strings, empty input and
/// anything malformed yield `None` so the field is simply omitted.
pub fn coerce_number(raw: &str) -> Option<NumOrStr> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(NumOrStr::Num(n));
    }
    if is_placeholder(trimmed) {
        return Some(NumOrStr::Str(trimmed.to_string()));
    }
    debug!(value = trimmed, "Dropping malformed numeric field");
    None
}

/// Splits a comma/newline separated form field, trimming and dropping empties
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Joins a list back into its form representation
pub fn join_list(items: &[String]) -> String {
    items.join(",")
}

/// Returns `None` for empty (after trim) strings
pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Lenient Readers (foreign JSON)
// ============================================================================

/// Reads a scalar as form text: strings verbatim, numbers and bools printed
pub fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reads a key of an object as form text
pub fn text_at(obj: &Map<String, Value>, key: &str) -> Option<String> {
    text_of(obj.get(key))
}

/// Reads a boolean, accepting `"true"`/`"1"` strings from hand-written configs
pub fn bool_at(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(matches!(s.trim(), "true" | "1")),
        Value::Number(n) => Some(n.as_i64().is_some_and(|n| n != 0)),
        _ => None,
    }
}

/// Reads a string or an array of scalars as a list of strings
pub fn list_of(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| text_of(Some(v)))
            .collect(),
        Some(other) => text_of(Some(other))
            .map(|s| split_list(&s))
            .unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Reads a key of an object as a list of strings
pub fn list_at(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    list_of(obj.get(key))
}

/// Borrows a nested object by key
pub fn object_at<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}

/// Borrows the first element of an array under `key`, if it is an object
pub fn first_object_at<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> Option<&'a Map<String, Value>> {
    obj.get(key)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)
}
