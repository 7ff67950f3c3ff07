//! Error types for the ingestion pipeline

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors starting or running the directory watcher
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Watch directory does not exist or is not a directory: {}", .0.display())]
    MissingDirectory(PathBuf),
}

/// Errors raised by content or entity extractors
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No extractor configured for {kind} files")]
    NotConfigured { kind: &'static str },

    #[error("Failed to spawn extractor '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Extractor '{program}' exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Extractor task aborted: {0}")]
    Aborted(String),

    #[error("Extraction failed: {0}")]
    Other(String),
}

/// Errors from the versioned projection layer
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("Unknown view: {0}")]
    UnknownView(String),

    #[error("Schema version {0} is not valid for registration")]
    InvalidVersion(i64),

    #[error("Schema version {0} already has a layout")]
    DuplicateVersion(i64),

    #[error("Cannot shape a write for schema version {found}; latest is {latest}")]
    UnsupportedWriteVersion { found: String, latest: i64 },

    #[error("Event {0} has no schema version to shape an update for")]
    MissingVersion(i64),

    #[error("Nothing to update: no recognized fields in payload")]
    EmptyUpdate,
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
