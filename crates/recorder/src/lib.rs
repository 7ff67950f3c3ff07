//! Recorder ingestion pipeline.
//!
//! Files dropped into the upload directory are debounced by
//! [`StabilityWatcher`], routed by [`Dispatcher`] to the configured
//! extractor and persisted through [`recorder_db::EventStore`]. Reads go
//! back out through [`VersionedProjection`], which hides the difference
//! between row layouts written by older schema versions.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod projection;
pub mod watcher;

pub use config::RecorderConfig;
pub use dispatch::{DispatchOutcome, Dispatcher, FileKind};
pub use error::{ConfigError, ExtractError, ProjectionError, WatchError};
pub use extract::{ArtifactDir, CommandExtractor, ContentExtractor, EntityExtractor, ExtractedFile, NoEntities};
pub use projection::{Layout, VersionedProjection, View, FLAT_LAYOUT, NESTED_LAYOUT};
pub use watcher::{FileState, StabilityConfig, StabilityWatcher, StableFileHandler};
