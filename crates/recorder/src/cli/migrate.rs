//! Migrate command - bring the live table up to the current declaration

use super::open_store;
use anyhow::Result;
use recorder::RecorderConfig;
use recorder_db::CURRENT_SCHEMA_VERSION;

pub async fn run(config: &RecorderConfig) -> Result<()> {
    let mut store = open_store(config).await?;
    let mut added = store.added_on_open().to_vec();
    added.extend(store.migrate().await?);

    println!("Database: {}", config.paths.database_path.display());
    println!("Schema version: {}", CURRENT_SCHEMA_VERSION);
    if added.is_empty() {
        println!("No columns added");
    } else {
        println!("Added columns: {}", added.join(", "));
    }

    println!("Live columns:");
    let declared: Vec<&str> = store.schema().columns().iter().map(|c| c.name.as_str()).collect();
    for column in store.live_columns() {
        let marker = if declared.contains(&column) { "" } else { " (legacy)" };
        println!("  {}{}", column, marker);
    }

    store.close().await;
    Ok(())
}
