//! Error types for the event store.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Store errors.
///
/// The public CRUD surface folds these into sentinels; they surface directly
/// only from `open`, `migrate` and the search queries.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The table declaration could not be parsed
    #[error("Schema declaration error: {0}")]
    Schema(String),

    /// A row referenced a column the live table does not have
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

impl DbError {
    /// Create a schema declaration error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }
}
