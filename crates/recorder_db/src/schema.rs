//! Table declaration for the events store.
//!
//! The CREATE TABLE statement below is the single source of truth: column
//! names, types and per-column defaults are all derived from it at startup.

use crate::error::{DbError, Result};
use crate::types::{DbValue, StorageRow};

/// Layout version stamped on every newly written record.
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Column holding the nested extraction payload under schema version 2.
pub const EXTRACTION_COLUMN: &str = "ner_extract";

/// Current declaration of the events table.
pub const EVENTS_TABLE_SQL: &str = r#"CREATE TABLE IF NOT EXISTS events (
    event_id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    importance REAL,
    tags TEXT,
    file_original TEXT,
    file_processed TEXT,
    done INTEGER,
    ner_extract TEXT,
    schema_version INTEGER
)"#;

/// Storage class a declared column type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAffinity {
    Text,
    Integer,
    Real,
    Other,
}

impl ColumnAffinity {
    /// Classify a declared type the way SQLite assigns affinity.
    pub fn from_decl_type(decl_type: &str) -> Self {
        let upper = decl_type.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnAffinity::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            ColumnAffinity::Text
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnAffinity::Real
        } else {
            ColumnAffinity::Other
        }
    }
}

/// One column of a parsed declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Declared type as written, upper-cased (e.g. `INTEGER`, `TEXT`)
    pub decl_type: String,
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn affinity(&self) -> ColumnAffinity {
        ColumnAffinity::from_decl_type(&self.decl_type)
    }
}

/// Parsed CREATE TABLE declaration.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: String,
    create_sql: String,
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Parse a `CREATE TABLE [IF NOT EXISTS] name (...)` statement.
    pub fn parse(create_sql: &str) -> Result<Self> {
        let open = create_sql
            .find('(')
            .ok_or_else(|| DbError::schema("missing opening parenthesis"))?;
        let close = create_sql
            .rfind(')')
            .filter(|close| *close > open)
            .ok_or_else(|| DbError::schema("missing closing parenthesis"))?;

        let table = parse_table_name(&create_sql[..open])?;
        let mut columns = Vec::new();

        for definition in split_top_level(&create_sql[open + 1..close]) {
            let mut tokens = definition.split_whitespace();
            let Some(first) = tokens.next() else {
                continue;
            };
            if is_table_constraint(first) {
                continue;
            }

            let name = unquote(first);
            if !is_identifier(name) {
                return Err(DbError::schema(format!("invalid column name: {first}")));
            }
            let decl_type = tokens.next().unwrap_or("").to_ascii_uppercase();
            let primary_key = definition.to_ascii_uppercase().contains("PRIMARY KEY");

            columns.push(ColumnDef {
                name: name.to_string(),
                decl_type,
                primary_key,
            });
        }

        if columns.is_empty() {
            return Err(DbError::schema(format!("table {table} declares no columns")));
        }

        Ok(Self {
            table,
            create_sql: create_sql.to_string(),
            columns,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn create_sql(&self) -> &str {
        &self.create_sql
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Derive the per-column defaults from the declared types.
    pub fn defaults(&self) -> DefaultsTemplate {
        let values = self
            .columns
            .iter()
            .filter(|c| !c.primary_key)
            .map(|c| (c.name.clone(), default_for(c)))
            .collect();
        DefaultsTemplate { values }
    }
}

fn default_for(column: &ColumnDef) -> DbValue {
    match column.name.as_str() {
        "schema_version" => DbValue::Integer(CURRENT_SCHEMA_VERSION),
        "done" => DbValue::Integer(0),
        _ => match column.affinity() {
            ColumnAffinity::Text => DbValue::Text(String::new()),
            ColumnAffinity::Integer => DbValue::Integer(0),
            ColumnAffinity::Real => DbValue::Real(0.0),
            ColumnAffinity::Other => DbValue::Null,
        },
    }
}

/// Default value per column, used to fill whatever a caller omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultsTemplate {
    values: StorageRow,
}

impl DefaultsTemplate {
    /// A template with no defaults; used when building update payloads.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&DbValue> {
        self.values.get(column)
    }

    pub fn row(&self) -> &StorageRow {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn parse_table_name(head: &str) -> Result<String> {
    let tokens: Vec<&str> = head.split_whitespace().collect();
    let table_pos = tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case("TABLE"))
        .ok_or_else(|| DbError::schema("not a CREATE TABLE statement"))?;

    let mut rest = &tokens[table_pos + 1..];
    if rest.len() >= 3
        && rest[0].eq_ignore_ascii_case("IF")
        && rest[1].eq_ignore_ascii_case("NOT")
        && rest[2].eq_ignore_ascii_case("EXISTS")
    {
        rest = &rest[3..];
    }

    let name = rest
        .first()
        .map(|t| unquote(t))
        .ok_or_else(|| DbError::schema("missing table name"))?;
    if !is_identifier(name) {
        return Err(DbError::schema(format!("invalid table name: {name}")));
    }
    Ok(name.to_string())
}

/// Split a column list on commas that are not nested inside parentheses.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in body.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn is_table_constraint(token: &str) -> bool {
    let keyword = token.split('(').next().unwrap_or(token);
    ["PRIMARY", "UNIQUE", "CHECK", "FOREIGN", "CONSTRAINT"]
        .iter()
        .any(|kw| keyword.eq_ignore_ascii_case(kw))
}

fn unquote(token: &str) -> &str {
    token.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
}

/// Identifiers are interpolated into SQL, so only plain names are accepted.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
