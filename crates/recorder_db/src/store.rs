//! CRUD over the events table.
//!
//! Every public operation is one immediately-committed statement. Write
//! operations report failure through their return value (`CREATION_FAILED`,
//! `false`, `None`) and log the underlying error.

use crate::adapter::SchemaAdapter;
use crate::error::{DbError, Result};
use crate::schema::{DefaultsTemplate, TableSchema};
use crate::types::{DbValue, EventId, Record, SearchFilters, StorageRow, CREATION_FAILED, TIMESTAMP_FORMAT};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Keys an update may never rewrite.
const IMMUTABLE_ON_UPDATE: &[&str] = &["schema_version", "created_at"];

/// Schema-versioned event store.
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
    schema: Arc<TableSchema>,
    defaults: Arc<DefaultsTemplate>,
    primary_key: Arc<str>,
    live_columns: Arc<BTreeSet<String>>,
    added_on_open: Arc<[String]>,
}

impl EventStore {
    /// Open or create the store at `path` using the current declaration.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_declaration(path, crate::schema::EVENTS_TABLE_SQL).await
    }

    /// Open or create the store at `path` from an explicit CREATE TABLE declaration.
    ///
    /// Columns present in the declaration but missing from an existing table
    /// are added; existing rows are left as they are.
    pub async fn open_with_declaration(path: impl AsRef<Path>, declaration: &str) -> Result<Self> {
        let path = path.as_ref();
        let schema = TableSchema::parse(declaration)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;

        let store = Self::initialize(pool, schema).await?;
        info!(path = %path.display(), "Event store opened");
        Ok(store)
    }

    /// Private in-memory store, one connection for its whole lifetime.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_declaration(crate::schema::EVENTS_TABLE_SQL).await
    }

    pub async fn open_in_memory_with_declaration(declaration: &str) -> Result<Self> {
        let schema = TableSchema::parse(declaration)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::initialize(pool, schema).await
    }

    async fn initialize(pool: SqlitePool, schema: TableSchema) -> Result<Self> {
        let primary_key: Arc<str> = schema
            .primary_key()
            .map(|c| Arc::from(c.name.as_str()))
            .ok_or_else(|| DbError::schema(format!("table {} has no primary key", schema.table())))?;

        sqlx::query(schema.create_sql()).execute(&pool).await?;

        let defaults = Arc::new(schema.defaults());
        let mut store = Self {
            pool,
            schema: Arc::new(schema),
            defaults,
            primary_key,
            live_columns: Arc::new(BTreeSet::new()),
            added_on_open: Arc::from(Vec::new()),
        };
        let added = store.migrate().await?;
        store.added_on_open = Arc::from(added);
        Ok(store)
    }

    /// Add every declared column the live table lacks. Returns the added names.
    pub async fn migrate(&mut self) -> Result<Vec<String>> {
        let mut existing = self.fetch_live_columns().await?;
        let mut added = Vec::new();

        for column in self.schema.columns() {
            if existing.contains(&column.name) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                self.schema.table(),
                column.name,
                column.decl_type
            );
            sqlx::query(&sql).execute(&self.pool).await?;
            info!(table = self.schema.table(), column = %column.name, "Added missing column");
            existing.insert(column.name.clone());
            added.push(column.name.clone());
        }

        self.live_columns = Arc::new(existing);
        Ok(added)
    }

    async fn fetch_live_columns(&self) -> Result<BTreeSet<String>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", self.schema.table()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(DbError::from))
            .collect()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn defaults(&self) -> &DefaultsTemplate {
        &self.defaults
    }

    /// Columns of the live table, including legacy ones absent from the declaration.
    pub fn live_columns(&self) -> impl Iterator<Item = &str> {
        self.live_columns.iter().map(String::as_str)
    }

    /// Columns the startup migration had to add.
    pub fn added_on_open(&self) -> &[String] {
        &self.added_on_open
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the underlying pool.
    pub async fn close(self) {
        self.pool.close().await;
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Insert a record. Returns the new identifier, or [`CREATION_FAILED`].
    pub async fn create(&self, record: &Record) -> EventId {
        match self.try_create(record).await {
            Ok(id) => {
                info!(event_id = id, "Event created");
                id
            }
            Err(e) => {
                error!(error = %e, "Failed to create event");
                CREATION_FAILED
            }
        }
    }

    async fn try_create(&self, record: &Record) -> Result<EventId> {
        let mut row = SchemaAdapter::to_storage(record, &self.defaults);
        if row.remove(self.primary_key.as_ref()).is_some() {
            debug!(column = %self.primary_key, "Ignoring caller-supplied identifier");
        }
        self.check_columns(&row)?;

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.schema.table(),
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for value in row.values() {
            query = bind_value(query, value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// True only if the row exists and the probe itself succeeded.
    pub async fn exists(&self, id: EventId) -> bool {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
            self.schema.table(),
            self.primary_key
        );
        match sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await {
            Ok(row) => row.is_some(),
            Err(e) => {
                error!(event_id = id, error = %e, "Existence check failed");
                false
            }
        }
    }

    /// Read one record, or `None` when it does not exist.
    pub async fn read(&self, id: EventId) -> Option<Record> {
        if !self.exists(id).await {
            return None;
        }
        match self.try_read(id).await {
            Ok(record) => record,
            Err(e) => {
                error!(event_id = id, error = %e, "Failed to read event");
                None
            }
        }
    }

    async fn try_read(&self, id: EventId) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            self.schema.table(),
            self.primary_key
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|row| decode_row(&row).map(|r| SchemaAdapter::from_storage(&r)))
            .transpose()
    }

    /// Overlay the supplied keys onto an existing record and re-stamp `updated_at`.
    ///
    /// Keys absent from `partial` are untouched. Container values replace the
    /// stored column wholesale.
    pub async fn update(&self, id: EventId, partial: &Record) -> bool {
        if !self.exists(id).await {
            warn!(event_id = id, "Update skipped, event does not exist");
            return false;
        }
        match self.try_update(id, partial).await {
            Ok(()) => {
                info!(event_id = id, fields = partial.len(), "Event updated");
                true
            }
            Err(e) => {
                error!(event_id = id, error = %e, "Failed to update event");
                false
            }
        }
    }

    async fn try_update(&self, id: EventId, partial: &Record) -> Result<()> {
        let mut row = SchemaAdapter::to_storage(partial, &DefaultsTemplate::empty());

        // to_storage stamps created_at when absent; on update it must stay put.
        for key in std::iter::once(self.primary_key.as_ref()).chain(IMMUTABLE_ON_UPDATE.iter().copied()) {
            row.remove(key);
            if partial.contains_key(key) {
                debug!(event_id = id, column = key, "Ignoring immutable column in update");
            }
        }
        self.check_columns(&row)?;

        let assignments: Vec<String> = row.keys().map(|k| format!("{k} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.schema.table(),
            assignments.join(", "),
            self.primary_key
        );

        let mut query = sqlx::query(&sql);
        for value in row.values() {
            query = bind_value(query, value);
        }
        query.bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Remove a record. `false` when it did not exist or the delete failed.
    pub async fn delete(&self, id: EventId) -> bool {
        if !self.exists(id).await {
            warn!(event_id = id, "Delete skipped, event does not exist");
            return false;
        }
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            self.schema.table(),
            self.primary_key
        );
        match sqlx::query(&sql).bind(id).execute(&self.pool).await {
            Ok(_) => {
                info!(event_id = id, "Event deleted");
                true
            }
            Err(e) => {
                error!(event_id = id, error = %e, "Failed to delete event");
                false
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Records matching every set filter, ordered by identifier.
    ///
    /// Creation times are compared through SQLite's `datetime()`, so rows
    /// written with a space separator or without seconds still match.
    pub async fn search(&self, filters: &SearchFilters) -> Result<Vec<Record>> {
        let mut conditions: Vec<(&str, DbValue)> = Vec::new();
        if let Some(from) = filters.created_from {
            conditions.push((
                "datetime(created_at) >= datetime(?)",
                DbValue::Text(from.format(TIMESTAMP_FORMAT).to_string()),
            ));
        }
        if let Some(to) = filters.created_to {
            conditions.push((
                "datetime(created_at) <= datetime(?)",
                DbValue::Text(to.format(TIMESTAMP_FORMAT).to_string()),
            ));
        }
        if let Some(min) = filters.min_importance {
            conditions.push(("importance >= ?", DbValue::Real(min)));
        }
        self.select_where(conditions).await
    }

    /// Every record.
    pub async fn search_all(&self) -> Result<Vec<Record>> {
        self.search(&SearchFilters::default()).await
    }

    /// Records whose `done` flag is not set.
    pub async fn search_pending(&self) -> Result<Vec<Record>> {
        self.select_where(vec![("done = ?", DbValue::Integer(0))]).await
    }

    async fn select_where(&self, conditions: Vec<(&str, DbValue)>) -> Result<Vec<Record>> {
        let mut sql = format!("SELECT * FROM {}", self.schema.table());
        if !conditions.is_empty() {
            let clauses: Vec<&str> = conditions.iter().map(|(clause, _)| *clause).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {} ASC", self.primary_key));

        let mut query = sqlx::query(&sql);
        for (_, value) in &conditions {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| decode_row(row).map(|r| SchemaAdapter::from_storage(&r)))
            .collect()
    }

    fn check_columns(&self, row: &StorageRow) -> Result<()> {
        match row.keys().find(|k| !self.live_columns.contains(*k)) {
            Some(unknown) => Err(DbError::UnknownColumn(unknown.clone())),
            None => Ok(()),
        }
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q DbValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Integer(v) => query.bind(*v),
        DbValue::Real(v) => query.bind(*v),
        DbValue::Text(v) => query.bind(v.as_str()),
    }
}

/// Read every column of a row by its runtime storage class.
fn decode_row(row: &SqliteRow) -> Result<StorageRow> {
    let mut out = StorageRow::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let (is_null, type_name) = {
            let raw = row.try_get_raw(idx)?;
            (raw.is_null(), raw.type_info().name().to_string())
        };

        let value = if is_null {
            DbValue::Null
        } else {
            match type_name.as_str() {
                "INTEGER" | "BIGINT" | "INT8" | "BOOLEAN" => DbValue::Integer(row.try_get(idx)?),
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => DbValue::Real(row.try_get(idx)?),
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get(idx)?;
                    DbValue::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => DbValue::Text(row.try_get(idx)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}
