//! Debounced file-stability detection.
//!
//! Every create/modify notification for a path not already in flight starts
//! one monitoring task. The task polls the file's size and modification time
//! until they have been unchanged for the configured stability window, then
//! hands the path to the handler exactly once. Paths leave the in-flight set
//! on every terminal outcome, so a later event for the same path is
//! processed again.

use crate::error::WatchError;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Timing bounds for the stability poll loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityConfig {
    /// How long size and mtime must stay unchanged
    pub stable_for: Duration,
    /// Delay between two stat calls
    pub check_interval: Duration,
    /// Give up if the file is not stable this long after arrival
    pub timeout: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            stable_for: Duration::from_secs(10),
            check_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Arrived,
    Stabilizing,
    Stable,
    TimedOut,
    Vanished,
}

impl FileState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileState::Stable | FileState::TimedOut | FileState::Vanished)
    }
}

/// Size and modification time observed by one stat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileSnapshot {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().ok(),
        }
    }
}

/// A path under stability evaluation.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub last: FileSnapshot,
    pub arrived_at: Instant,
    pub unchanged_since: Instant,
    pub state: FileState,
}

impl WatchedFile {
    pub fn arrive(path: PathBuf, snapshot: FileSnapshot, now: Instant) -> Self {
        Self {
            path,
            last: snapshot,
            arrived_at: now,
            unchanged_since: now,
            state: FileState::Arrived,
        }
    }

    /// Feed one poll result into the state machine. `None` means the stat failed.
    pub fn observe(&mut self, snapshot: Option<FileSnapshot>, now: Instant, config: &StabilityConfig) -> FileState {
        if self.state.is_terminal() {
            return self.state;
        }

        let Some(snapshot) = snapshot else {
            self.state = FileState::Vanished;
            return self.state;
        };

        if snapshot == self.last {
            if now.duration_since(self.unchanged_since) >= config.stable_for {
                self.state = FileState::Stable;
                return self.state;
            }
        } else {
            self.last = snapshot;
            self.unchanged_since = now;
        }

        self.state = if now.duration_since(self.arrived_at) > config.timeout {
            FileState::TimedOut
        } else {
            FileState::Stabilizing
        };
        self.state
    }
}

async fn snapshot(path: &Path) -> Option<FileSnapshot> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Some(FileSnapshot::from_metadata(&meta)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "stat failed");
            None
        }
    }
}

/// Poll `path` until it reaches a terminal state. Sleeps between checks.
pub async fn wait_until_stable(path: &Path, config: &StabilityConfig) -> WatchedFile {
    let Some(initial) = snapshot(path).await else {
        let mut file = WatchedFile::arrive(
            path.to_path_buf(),
            FileSnapshot { size: 0, modified: None },
            Instant::now(),
        );
        file.state = FileState::Vanished;
        return file;
    };

    let mut file = WatchedFile::arrive(path.to_path_buf(), initial, Instant::now());
    loop {
        tokio::time::sleep(config.check_interval).await;
        let observed = snapshot(path).await;
        if file.observe(observed, Instant::now(), config).is_terminal() {
            return file;
        }
    }
}

/// Receives each path once it is stable.
pub trait StableFileHandler: Send + Sync + 'static {
    fn on_stable(&self, path: PathBuf) -> impl Future<Output = anyhow::Result<()>> + Send;
}

type InFlight = Arc<Mutex<HashSet<PathBuf>>>;

fn lock(set: &InFlight) -> MutexGuard<'_, HashSet<PathBuf>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes its path from the in-flight set when dropped, including on panic.
struct InFlightGuard {
    set: InFlight,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.path);
        debug!(path = %self.path.display(), "Removed from in-flight set");
    }
}

/// Directory watcher with per-path stability debouncing.
pub struct StabilityWatcher<H> {
    config: StabilityConfig,
    handler: Arc<H>,
    in_flight: InFlight,
}

impl<H: StableFileHandler> StabilityWatcher<H> {
    pub fn new(config: StabilityConfig, handler: Arc<H>) -> Self {
        Self {
            config,
            handler,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        lock(&self.in_flight).contains(path)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Start monitoring `path` unless it is already in flight.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn track(&self, path: PathBuf) -> Option<JoinHandle<FileState>> {
        {
            let mut set = lock(&self.in_flight);
            if !set.insert(path.clone()) {
                debug!(path = %path.display(), "Already in flight, skipping");
                return None;
            }
        }
        debug!(path = %path.display(), "Added to in-flight set");

        let guard = InFlightGuard {
            set: Arc::clone(&self.in_flight),
            path: path.clone(),
        };
        let handler = Arc::clone(&self.handler);
        let config = self.config;

        Some(tokio::spawn(async move {
            let _guard = guard;
            monitor(path, config, handler).await
        }))
    }

    /// Route one filesystem notification. Only create and modify events of
    /// non-directory paths start monitoring; renames, removals and accesses
    /// are ignored.
    pub fn handle_event(&self, event: &Event) -> Vec<JoinHandle<FileState>> {
        match event.kind {
            EventKind::Create(_) => {}
            EventKind::Modify(ModifyKind::Name(_)) => return Vec::new(),
            EventKind::Modify(_) => {}
            _ => return Vec::new(),
        }

        event
            .paths
            .iter()
            .filter(|path| !path.is_dir())
            .filter_map(|path| self.track(path.clone()))
            .collect()
    }

    /// Watch `root` recursively until `shutdown` resolves.
    pub async fn run(&self, root: &Path, shutdown: impl Future<Output = ()>) -> Result<(), WatchError> {
        if !root.is_dir() {
            return Err(WatchError::MissingDirectory(root.to_path_buf()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => error!(error = %e, "Filesystem watcher error"),
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!(path = %root.display(), "Watching directory");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = rx.recv() => match event {
                    Some(event) => {
                        self.handle_event(&event);
                    }
                    None => break,
                },
            }
        }

        info!(path = %root.display(), "Stopped watching directory");
        Ok(())
    }
}

async fn monitor<H: StableFileHandler>(path: PathBuf, config: StabilityConfig, handler: Arc<H>) -> FileState {
    info!(path = %path.display(), "Waiting for file to stabilize");
    let file = wait_until_stable(&path, &config).await;

    match file.state {
        FileState::Stable => {
            info!(path = %path.display(), "File stable");
            if let Err(e) = handler.on_stable(path.clone()).await {
                error!(path = %path.display(), error = %e, "Stable-file handler failed");
            }
        }
        FileState::TimedOut => {
            warn!(
                path = %path.display(),
                timeout_secs = config.timeout.as_secs_f64(),
                "File never stabilized, skipping"
            );
        }
        FileState::Vanished => {
            warn!(path = %path.display(), "File vanished before stabilizing, skipping");
        }
        FileState::Arrived | FileState::Stabilizing => {}
    }
    file.state
}
