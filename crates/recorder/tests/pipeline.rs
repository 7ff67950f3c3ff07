//! Dispatcher end to end: classify, extract, store, read back.

use recorder::{
    ArtifactDir, ContentExtractor, DispatchOutcome, Dispatcher, ExtractError, ExtractedFile, FileState,
    StabilityConfig, StabilityWatcher, VersionedProjection,
};
use recorder_db::EventStore;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Stands in for speech or image recognition: writes a fixed transcript.
struct StubTranscriber {
    artifacts: ArtifactDir,
    text: &'static str,
}

impl ContentExtractor for StubTranscriber {
    fn extract(&self, path: &Path) -> Result<ExtractedFile, ExtractError> {
        let file_processed = self.artifacts.write_text("audio", self.text)?;
        Ok(ExtractedFile {
            file_processed,
            file_original: path.to_path_buf(),
        })
    }
}

struct BrokenExtractor;

impl ContentExtractor for BrokenExtractor {
    fn extract(&self, _path: &Path) -> Result<ExtractedFile, ExtractError> {
        Err(ExtractError::Other("model not loaded".to_string()))
    }
}

struct TestEnv {
    tmp: TempDir,
    store: EventStore,
}

impl TestEnv {
    async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let store = EventStore::open(tmp.path().join("data").join("events.sqlite3"))
            .await
            .unwrap();
        Self { tmp, store }
    }

    fn upload(&self, name: &str, content: &[u8]) -> PathBuf {
        let dir = self.tmp.path().join("uploads");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn artifacts(&self) -> ArtifactDir {
        ArtifactDir::new(self.tmp.path().join("extracted"))
    }

    fn path_string(path: &Path) -> Value {
        Value::String(path.to_string_lossy().replace('\\', "/"))
    }
}

#[tokio::test]
async fn test_text_file_is_stored_with_passthrough_paths() {
    let env = TestEnv::new().await;
    let path = env.upload("note.txt", b"lunch with Bob\nat noon\n");
    let dispatcher = Dispatcher::new(env.store.clone());

    let id = match dispatcher.dispatch(&path).await {
        DispatchOutcome::Stored(id) => id,
        other => panic!("expected Stored, got {:?}", other),
    };
    assert!(id > 0);

    let record = env.store.read(id).await.unwrap();
    assert_eq!(record["file_original"], TestEnv::path_string(&path));
    assert_eq!(record["file_processed"], TestEnv::path_string(&path));
    assert_eq!(record["schema_version"], json!(2));
    assert_eq!(record["done"], json!(false));
    assert_eq!(record["ner_extract"], json!({"events_full": "lunch with Bobat noon"}));

    let summary = VersionedProjection::builtin().get_view(&[record], "summary").unwrap();
    assert_eq!(summary[0]["events_full"], json!("lunch with Bobat noon"));
    assert_eq!(summary[0]["dates"], Value::Null);
}

#[tokio::test]
async fn test_audio_goes_through_content_extractor() {
    let env = TestEnv::new().await;
    let path = env.upload("memo.WAV", b"RIFF....");
    let dispatcher = Dispatcher::new(env.store.clone()).with_audio(Arc::new(StubTranscriber {
        artifacts: env.artifacts(),
        text: "call the dentist friday",
    }));

    let DispatchOutcome::Stored(id) = dispatcher.dispatch(&path).await else {
        panic!("audio file was not stored");
    };

    let record = env.store.read(id).await.unwrap();
    assert_eq!(record["file_original"], TestEnv::path_string(&path));
    let processed = record["file_processed"].as_str().unwrap();
    assert!(processed.contains("extracted"));
    assert!(processed.ends_with(".txt"));
    assert_eq!(
        record["ner_extract"]["events_full"],
        json!("call the dentist friday")
    );
}

#[tokio::test]
async fn test_unsupported_type_is_skipped() {
    let env = TestEnv::new().await;
    let path = env.upload("report.pdf", b"%PDF");
    let dispatcher = Dispatcher::new(env.store.clone());

    assert_eq!(dispatcher.dispatch(&path).await, DispatchOutcome::Unsupported);
    assert!(env.store.search_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_extractor_failures_stop_only_that_file() {
    let env = TestEnv::new().await;
    let dispatcher = Dispatcher::new(env.store.clone()).with_image(Arc::new(BrokenExtractor));

    let image = env.upload("board.png", b"\x89PNG");
    assert_eq!(dispatcher.dispatch(&image).await, DispatchOutcome::ExtractionFailed);

    // No audio extractor configured
    let audio = env.upload("memo.mp3", b"ID3");
    assert_eq!(dispatcher.dispatch(&audio).await, DispatchOutcome::ExtractionFailed);

    let text = env.upload("ok.txt", b"still works");
    assert!(matches!(dispatcher.dispatch(&text).await, DispatchOutcome::Stored(_)));
    assert_eq!(env.store.search_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_vanished_text_file_is_extraction_failure() {
    let env = TestEnv::new().await;
    let dispatcher = Dispatcher::new(env.store.clone());
    let missing = env.tmp.path().join("uploads").join("missing.txt");

    assert_eq!(dispatcher.dispatch(&missing).await, DispatchOutcome::ExtractionFailed);
}

#[tokio::test]
async fn test_storage_failure_is_reported() {
    let env = TestEnv::new().await;
    let narrow = EventStore::open_in_memory_with_declaration(
        "CREATE TABLE events (event_id INTEGER PRIMARY KEY AUTOINCREMENT, created_at TEXT NOT NULL, updated_at TEXT)",
    )
    .await
    .unwrap();
    let dispatcher = Dispatcher::new(narrow.clone());
    let path = env.upload("note.txt", b"hello");

    assert_eq!(dispatcher.dispatch(&path).await, DispatchOutcome::StorageFailed);
    assert!(narrow.search_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_watcher_feeds_dispatcher() {
    let env = TestEnv::new().await;
    let path = env.upload("a.txt", b"hello");
    let config = StabilityConfig {
        stable_for: Duration::from_millis(300),
        check_interval: Duration::from_millis(50),
        timeout: Duration::from_secs(5),
    };
    let watcher = StabilityWatcher::new(config, Arc::new(Dispatcher::new(env.store.clone())));

    assert_eq!(watcher.track(path.clone()).unwrap().await.unwrap(), FileState::Stable);

    let records = env.store.search_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["ner_extract"]["events_full"], json!("hello"));
}
