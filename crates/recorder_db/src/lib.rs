//! Schema-versioned event store for the recorder pipeline.
//!
//! One table, one row per ingested event. The table declaration in
//! [`schema`] is the single source of truth for columns and defaults; the
//! store adds missing columns on open and never drops legacy ones.
//!
//! # Usage
//!
//! ```rust,ignore
//! use recorder_db::{EventStore, Record, SearchFilters, CREATION_FAILED};
//!
//! let store = EventStore::open("~/.recorder/events.sqlite3").await?;
//!
//! let id = store.create(&record).await;
//! if id == CREATION_FAILED {
//!     // nothing was written
//! }
//!
//! let important = store.search(&SearchFilters::new().min_importance(0.5)).await?;
//! ```

mod adapter;
mod error;
pub mod schema;
mod store;
mod types;

pub use adapter::{normalize_timestamp, SchemaAdapter, TIMESTAMP_COLUMNS, TIMESTAMP_READ_FORMATS};
pub use error::{DbError, Result};
pub use schema::{
    ColumnAffinity, ColumnDef, DefaultsTemplate, TableSchema, CURRENT_SCHEMA_VERSION,
    EVENTS_TABLE_SQL, EXTRACTION_COLUMN,
};
pub use store::EventStore;
pub use types::*;
