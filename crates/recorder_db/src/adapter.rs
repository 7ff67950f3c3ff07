//! Conversion between application records and storage rows.

use crate::schema::DefaultsTemplate;
use crate::types::{DbValue, Record, StorageRow, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use serde_json::{Number, Value};

/// Columns re-rendered canonically on read.
pub const TIMESTAMP_COLUMNS: &[&str] = &["created_at", "updated_at"];

/// Formats timestamps have been written in over time, tried in order.
pub const TIMESTAMP_READ_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Column prefix marking a filesystem path.
const PATH_COLUMN_PREFIX: &str = "file_";

/// Stateless record ⇄ row adapter.
pub struct SchemaAdapter;

impl SchemaAdapter {
    /// Build a storage row from `record`, filling omitted columns from `defaults`.
    pub fn to_storage(record: &Record, defaults: &DefaultsTemplate) -> StorageRow {
        Self::to_storage_at(record, defaults, chrono::Local::now().naive_local())
    }

    /// [`Self::to_storage`] with an explicit clock.
    pub fn to_storage_at(record: &Record, defaults: &DefaultsTemplate, now: NaiveDateTime) -> StorageRow {
        let mut row = defaults.row().clone();
        for (key, value) in record {
            row.insert(key.clone(), encode_value(value));
        }

        let stamp = DbValue::Text(now.format(TIMESTAMP_FORMAT).to_string());
        let has_created_at = match row.get("created_at") {
            None | Some(DbValue::Null) => false,
            Some(DbValue::Text(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if !has_created_at {
            row.insert("created_at".to_string(), stamp.clone());
        }
        row.insert("updated_at".to_string(), stamp);
        row
    }

    /// Turn a storage row back into a record. Never fails: text that does
    /// not parse as JSON or as a known timestamp format is passed through.
    pub fn from_storage(row: &StorageRow) -> Record {
        row.iter()
            .map(|(column, value)| (column.clone(), decode_value(column, value)))
            .collect()
    }
}

fn encode_value(value: &Value) -> DbValue {
    match value {
        Value::Null => DbValue::Null,
        Value::Bool(b) => DbValue::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => DbValue::Integer(i),
            None => n.as_f64().map(DbValue::Real).unwrap_or(DbValue::Null),
        },
        Value::String(s) => DbValue::Text(s.clone()),
        // Storage columns are textual; containers go in as JSON text.
        Value::Array(_) | Value::Object(_) => DbValue::Text(value.to_string()),
    }
}

fn decode_value(column: &str, value: &DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Integer(i) if column == "done" => Value::Bool(*i != 0),
        DbValue::Integer(i) => Value::from(*i),
        DbValue::Real(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        DbValue::Text(text) => decode_text(column, text),
    }
}

fn decode_text(column: &str, text: &str) -> Value {
    if text.is_empty() || text == "None" {
        return Value::Null;
    }

    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
            return if column == "persons" {
                clean_persons(parsed)
            } else {
                parsed
            };
        }
    }

    if TIMESTAMP_COLUMNS.contains(&column) {
        return Value::String(normalize_timestamp(text));
    }

    if column.starts_with(PATH_COLUMN_PREFIX) {
        return Value::String(text.replace('\\', "/"));
    }

    Value::String(text.to_string())
}

/// Re-render `raw` canonically if any historical format matches, else return it as is.
pub fn normalize_timestamp(raw: &str) -> String {
    TIMESTAMP_READ_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Person mentions were once stored as lists of candidate spellings; keep the
/// first non-empty one per entry.
fn clean_persons(parsed: Value) -> Value {
    let Value::Array(items) = parsed else {
        return parsed;
    };

    let cleaned = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => {
                let name = name.trim();
                (!name.is_empty()).then(|| Value::String(name.to_string()))
            }
            Value::Array(candidates) => candidates.into_iter().find_map(|c| match c {
                Value::String(name) if !name.trim().is_empty() => {
                    Some(Value::String(name.trim().to_string()))
                }
                _ => None,
            }),
            _ => None,
        })
        .collect();
    Value::Array(cleaned)
}
