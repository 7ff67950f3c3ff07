//! One logical view over rows written under different schema versions.
//!
//! Version 1 rows keep every extraction field as its own top-level column.
//! Version 2 rows nest them inside the `ner_extract` object. A layout per
//! version knows where each field lives, both for reads and for updates;
//! views name the fields to pull.

use crate::error::ProjectionError;
use recorder_db::{EventId, EventStore, Record, CURRENT_SCHEMA_VERSION, EXTRACTION_COLUMN};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

pub const EXTRACTION_FIELDS: &[&str] = &[
    "dates",
    "times",
    "weeks",
    "places",
    "persons",
    "durations",
    "recurrences",
    "events_extract",
    "events_full",
];

pub const OUTER_FIELDS: &[&str] = &[
    "event_id",
    "created_at",
    "updated_at",
    "tags",
    "importance",
    "file_original",
    "file_processed",
    "done",
    "schema_version",
];

const SUMMARY_FIELDS: &[&str] = &["event_id", "dates", "times", "events_full"];

const SCHEMA_VERSION_FIELD: &str = "schema_version";

/// Named field selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Compact per-day listing
    Summary,
    /// Every extraction field followed by every outer field
    Detail,
}

impl View {
    pub fn fields(self) -> Vec<&'static str> {
        match self {
            View::Summary => SUMMARY_FIELDS.to_vec(),
            View::Detail => EXTRACTION_FIELDS.iter().chain(OUTER_FIELDS).copied().collect(),
        }
    }
}

impl FromStr for View {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" | "daily" => Ok(View::Summary),
            "detail" => Ok(View::Detail),
            other => Err(ProjectionError::UnknownView(other.to_string())),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Summary => write!(f, "summary"),
            View::Detail => write!(f, "detail"),
        }
    }
}

/// Pulls `fields` out of one stored record. Absent fields project to null.
pub type Projector = fn(&Record, &[&'static str]) -> Record;

/// Lays out vetted update fields for one version: outer fields first, then
/// extraction fields.
pub type Shaper = fn(Record, Record) -> Record;

/// Where one schema version keeps its fields, for reads and for writes.
#[derive(Clone, Copy)]
pub struct Layout {
    pub project: Projector,
    pub shape: Shaper,
}

/// Version 1: every extraction field is its own column.
pub const FLAT_LAYOUT: Layout = Layout {
    project: project_flat,
    shape: shape_flat,
};

/// Version 2: extraction fields travel together in one JSON column.
pub const NESTED_LAYOUT: Layout = Layout {
    project: project_nested,
    shape: shape_nested,
};

fn is_extraction_field(field: &str) -> bool {
    EXTRACTION_FIELDS.contains(&field)
}

pub fn project_flat(record: &Record, fields: &[&'static str]) -> Record {
    fields
        .iter()
        .map(|&field| {
            let value = record.get(field).cloned().unwrap_or(Value::Null);
            (field.to_string(), value)
        })
        .collect()
}

pub fn project_nested(record: &Record, fields: &[&'static str]) -> Record {
    let extraction = record.get(EXTRACTION_COLUMN).and_then(Value::as_object);
    fields
        .iter()
        .map(|&field| {
            let value = if is_extraction_field(field) {
                extraction.and_then(|e| e.get(field))
            } else {
                record.get(field)
            };
            (field.to_string(), value.cloned().unwrap_or(Value::Null))
        })
        .collect()
}

pub fn shape_flat(mut outer: Record, extraction: Record) -> Record {
    outer.extend(extraction);
    outer
}

/// The nested column is only written when the update carries extraction fields.
pub fn shape_nested(mut outer: Record, extraction: Record) -> Record {
    if !extraction.is_empty() {
        outer.insert(EXTRACTION_COLUMN.to_string(), Value::Object(extraction));
    }
    outer
}

fn record_version(record: &Record) -> Option<i64> {
    record.get(SCHEMA_VERSION_FIELD).and_then(Value::as_i64)
}

pub struct VersionedProjection {
    layouts: BTreeMap<i64, Layout>,
}

impl Default for VersionedProjection {
    fn default() -> Self {
        Self::builtin()
    }
}

impl VersionedProjection {
    pub fn empty() -> Self {
        Self {
            layouts: BTreeMap::new(),
        }
    }

    /// Layouts for every version this crate has written.
    pub fn builtin() -> Self {
        let mut layouts = BTreeMap::new();
        layouts.insert(1, FLAT_LAYOUT);
        layouts.insert(CURRENT_SCHEMA_VERSION, NESTED_LAYOUT);
        Self { layouts }
    }

    pub fn register(&mut self, version: i64, layout: Layout) -> Result<(), ProjectionError> {
        if version < 1 {
            return Err(ProjectionError::InvalidVersion(version));
        }
        if self.layouts.contains_key(&version) {
            return Err(ProjectionError::DuplicateVersion(version));
        }
        self.layouts.insert(version, layout);
        Ok(())
    }

    pub fn supports(&self, version: i64) -> bool {
        self.layouts.contains_key(&version)
    }

    /// Highest registered version, the one new writes use.
    pub fn latest_version(&self) -> Option<i64> {
        self.layouts.keys().next_back().copied()
    }

    /// Project `records` through the named view.
    pub fn get_view(&self, records: &[Record], view: &str) -> Result<Vec<Record>, ProjectionError> {
        let view: View = view.parse()?;
        Ok(self.project(records, view))
    }

    /// Records with a missing or unregistered version are skipped and logged.
    /// Output keys follow the view's field order.
    pub fn project(&self, records: &[Record], view: View) -> Vec<Record> {
        let fields = view.fields();
        records
            .iter()
            .filter_map(|record| {
                let layout = record_version(record).and_then(|v| self.layouts.get(&v));
                match layout {
                    Some(layout) => Some((layout.project)(record, &fields)),
                    None => {
                        warn!(
                            event_id = ?record.get("event_id"),
                            schema_version = ?record.get(SCHEMA_VERSION_FIELD),
                            "No layout for schema version, skipping record"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Convert a flat update payload into the latest storage layout.
    pub fn to_storage_shape(&self, flat: &Record) -> Result<Record, ProjectionError> {
        let latest = self.latest_version().unwrap_or(CURRENT_SCHEMA_VERSION);
        self.to_storage_shape_for(flat, latest)
    }

    /// Convert a flat update payload into the layout of `version`.
    ///
    /// A payload naming a different `schema_version` is rejected. Unrecognized
    /// keys are dropped with a warning.
    pub fn to_storage_shape_for(&self, flat: &Record, version: i64) -> Result<Record, ProjectionError> {
        let latest = self.latest_version().unwrap_or(CURRENT_SCHEMA_VERSION);
        let unsupported = |found: String| ProjectionError::UnsupportedWriteVersion { found, latest };

        let layout = self.layouts.get(&version).ok_or_else(|| unsupported(version.to_string()))?;
        match flat.get(SCHEMA_VERSION_FIELD) {
            None | Some(Value::Null) => {}
            Some(v) if v.as_i64() == Some(version) => {}
            Some(other) => return Err(unsupported(other.to_string())),
        }

        let mut outer = Record::new();
        let mut extraction = Record::new();
        for (key, value) in flat {
            if is_extraction_field(key) {
                extraction.insert(key.clone(), value.clone());
            } else if OUTER_FIELDS.contains(&key.as_str()) {
                outer.insert(key.clone(), value.clone());
            } else {
                warn!(field = %key, "Dropping unrecognized field from update");
            }
        }
        Ok((layout.shape)(outer, extraction))
    }

    /// Apply a flat update to stored event `id` in the layout the event was
    /// written with.
    ///
    /// `Ok(false)` when the event does not exist or the store rejected the
    /// write.
    pub async fn apply_update(&self, store: &EventStore, id: EventId, flat: &Record) -> Result<bool, ProjectionError> {
        let Some(current) = store.read(id).await else {
            warn!(event_id = id, "Update skipped, event does not exist");
            return Ok(false);
        };
        let version = record_version(&current).ok_or(ProjectionError::MissingVersion(id))?;

        let shaped = self.to_storage_shape_for(flat, version)?;
        if shaped.is_empty() {
            return Err(ProjectionError::EmptyUpdate);
        }
        Ok(store.update(id, &shaped).await)
    }
}
