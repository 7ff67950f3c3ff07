//! Updates land in the layout each stored event was written with.

use recorder::{ProjectionError, VersionedProjection, View};
use recorder_db::{EventStore, Record, EVENTS_TABLE_SQL};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Flat declaration from before extraction fields moved into one column.
const FLAT_TABLE_SQL: &str = r#"CREATE TABLE IF NOT EXISTS events (
    event_id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    importance REAL,
    tags TEXT,
    file_original TEXT,
    file_processed TEXT,
    done INTEGER,
    dates TEXT,
    times TEXT,
    events_full TEXT,
    schema_version INTEGER
)"#;

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

/// A store holding one version-1 event, reopened under the current declaration.
async fn store_with_flat_event(tmp: &TempDir) -> (EventStore, i64) {
    let path = tmp.path().join("events.sqlite3");
    let id = {
        let store = EventStore::open_with_declaration(&path, FLAT_TABLE_SQL).await.unwrap();
        let id = store
            .create(&record(json!({
                "schema_version": 1,
                "dates": ["2025-01-01"],
                "times": ["09:00"],
                "events_full": "dentist",
            })))
            .await;
        assert!(id > 0);
        store.close().await;
        id
    };
    let store = EventStore::open_with_declaration(&path, EVENTS_TABLE_SQL).await.unwrap();
    (store, id)
}

async fn summary(store: &EventStore, id: i64) -> Record {
    let record = store.read(id).await.unwrap();
    let mut out = VersionedProjection::builtin().project(&[record], View::Summary);
    out.remove(0)
}

#[tokio::test]
async fn test_update_of_flat_event_shows_in_views() {
    let tmp = TempDir::new().unwrap();
    let (store, id) = store_with_flat_event(&tmp).await;
    let projection = VersionedProjection::builtin();

    let updated = projection
        .apply_update(&store, id, &record(json!({"dates": ["2030-12-31"], "done": 1})))
        .await
        .unwrap();
    assert!(updated);

    let stored = store.read(id).await.unwrap();
    assert_eq!(stored["dates"], json!(["2030-12-31"]));
    assert_eq!(stored["ner_extract"], Value::Null);
    assert_eq!(stored["done"], json!(true));

    let view = summary(&store, id).await;
    assert_eq!(view["dates"], json!(["2030-12-31"]));
    assert_eq!(view["times"], json!(["09:00"]));
    assert_eq!(view["events_full"], json!("dentist"));
}

#[tokio::test]
async fn test_update_of_nested_event_stays_nested() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = store_with_flat_event(&tmp).await;
    let id = store
        .create(&record(json!({
            "schema_version": 2,
            "ner_extract": {"dates": ["2025-02-02"], "events_full": "standup"},
        })))
        .await;
    assert!(id > 0);

    let updated = VersionedProjection::builtin()
        .apply_update(&store, id, &record(json!({"events_full": "retro", "tags": ["team"]})))
        .await
        .unwrap();
    assert!(updated);

    let stored = store.read(id).await.unwrap();
    assert_eq!(stored["ner_extract"], json!({"events_full": "retro"}));
    assert_eq!(stored["tags"], json!(["team"]));
    assert_eq!(stored["events_full"], Value::Null);

    let view = summary(&store, id).await;
    assert_eq!(view["events_full"], json!("retro"));
}

#[tokio::test]
async fn test_update_rejects_payload_for_other_version() {
    let tmp = TempDir::new().unwrap();
    let (store, id) = store_with_flat_event(&tmp).await;

    let err = VersionedProjection::builtin()
        .apply_update(&store, id, &record(json!({"schema_version": 2, "dates": []})))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProjectionError::UnsupportedWriteVersion {
            found: "2".into(),
            latest: 2
        }
    );
    assert_eq!(store.read(id).await.unwrap()["dates"], json!(["2025-01-01"]));
}

#[tokio::test]
async fn test_update_of_unregistered_or_missing_event_does_not_succeed() {
    let store = EventStore::open_in_memory().await.unwrap();
    let projection = VersionedProjection::builtin();

    let missing = projection
        .apply_update(&store, 999, &record(json!({"done": 1})))
        .await
        .unwrap();
    assert!(!missing);

    let id = store.create(&record(json!({"schema_version": 9, "done": 0}))).await;
    let err = projection
        .apply_update(&store, id, &record(json!({"done": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, ProjectionError::UnsupportedWriteVersion { .. }));

    let unversioned = store.create(&record(json!({"done": 0}))).await;
    assert!(store.update(unversioned, &record(json!({"schema_version": null}))).await);
    let err = projection
        .apply_update(&store, unversioned, &record(json!({"done": 1})))
        .await
        .unwrap_err();
    assert_eq!(err, ProjectionError::MissingVersion(unversioned));
    assert_eq!(store.read(unversioned).await.unwrap()["done"], json!(false));
}

#[tokio::test]
async fn test_update_with_no_recognized_fields_is_rejected() {
    let store = EventStore::open_in_memory().await.unwrap();
    let id = store.create(&record(json!({"schema_version": 2}))).await;

    let err = VersionedProjection::builtin()
        .apply_update(&store, id, &record(json!({"colour": "red"})))
        .await
        .unwrap_err();
    assert_eq!(err, ProjectionError::EmptyUpdate);
}
