//! Value types shared by the adapter and the store.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Application-level record: field name to structured value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Storage-level row: column name to SQLite value, ordered by column name.
pub type StorageRow = BTreeMap<String, DbValue>;

/// Row identifier assigned by the store.
pub type EventId = i64;

/// Returned by [`crate::EventStore::create`] when the insert did not happen.
pub const CREATION_FAILED: EventId = -1;

/// Canonical on-disk timestamp format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Value type for row cells and query parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl DbValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Integer(v as i64)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Integer(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Real(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Integer(i64::from(v))
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DbValue::Null)
    }
}

/// Filters for [`crate::EventStore::search`]. Unset fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Inclusive lower bound on `created_at`
    pub created_from: Option<NaiveDateTime>,
    /// Inclusive upper bound on `created_at`
    pub created_to: Option<NaiveDateTime>,
    /// Inclusive lower bound on `importance`
    pub min_importance: Option<f64>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_from(mut self, from: NaiveDateTime) -> Self {
        self.created_from = Some(from);
        self
    }

    pub fn created_to(mut self, to: NaiveDateTime) -> Self {
        self.created_to = Some(to);
        self
    }

    pub fn min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.created_from.is_none() && self.created_to.is_none() && self.min_importance.is_none()
    }
}
