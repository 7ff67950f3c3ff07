//! Subcommands of the `recorder` binary

pub mod events;
pub mod migrate;
pub mod watch;

use anyhow::{Context, Result};
use recorder::RecorderConfig;
use recorder_db::EventStore;

/// Open the configured store. Opening also applies pending column additions.
pub async fn open_store(config: &RecorderConfig) -> Result<EventStore> {
    let path = &config.paths.database_path;
    EventStore::open(path)
        .await
        .with_context(|| format!("Failed to open event store at {}", path.display()))
}
