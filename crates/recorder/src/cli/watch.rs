//! Watch command - run the ingestion pipeline until interrupted

use super::open_store;
use anyhow::{Context, Result};
use recorder::{ArtifactDir, Dispatcher, RecorderConfig, StabilityWatcher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(config: RecorderConfig, dir: Option<PathBuf>) -> Result<()> {
    let upload_dir = dir.unwrap_or_else(|| config.paths.upload_dir.clone());
    std::fs::create_dir_all(&upload_dir)
        .with_context(|| format!("Failed to create upload directory {}", upload_dir.display()))?;

    let stability = config
        .stability
        .to_stability_config()
        .context("Invalid stability settings")?;
    let store = open_store(&config).await?;
    let artifacts = ArtifactDir::new(config.paths.extracted_dir.clone());

    let mut dispatcher = Dispatcher::new(store.clone());
    match &config.extractors.audio {
        Some(spec) => dispatcher = dispatcher.with_audio(Arc::new(spec.build(artifacts.clone(), "audio"))),
        None => warn!("No audio extractor configured; audio files will be skipped"),
    }
    match &config.extractors.image {
        Some(spec) => dispatcher = dispatcher.with_image(Arc::new(spec.build(artifacts, "image"))),
        None => warn!("No image extractor configured; image files will be skipped"),
    }

    let watcher = StabilityWatcher::new(stability, Arc::new(dispatcher));
    info!(
        path = %upload_dir.display(),
        stable_secs = stability.stable_for.as_secs_f64(),
        "Recorder started"
    );
    println!("Watching {} (Ctrl-C to stop)", upload_dir.display());

    watcher
        .run(&upload_dir, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    let pending = watcher.in_flight_count();
    if pending > 0 {
        warn!(pending, "Shutting down with files still stabilizing");
    }
    store.close().await;
    Ok(())
}
