//! Routes stable files to extraction and storage.

use crate::error::ExtractError;
use crate::extract::{ContentExtractor, EntityExtractor, ExtractedFile, NoEntities};
use crate::watcher::StableFileHandler;
use recorder_db::{EventId, EventStore, Record, CREATION_FAILED, CURRENT_SCHEMA_VERSION, EXTRACTION_COLUMN};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "flac", "m4a"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];
const TEXT_EXTENSIONS: &[&str] = &["txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Image,
    Text,
    Unsupported,
}

impl FileKind {
    /// Classify by extension, case-insensitively.
    pub fn classify(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return FileKind::Unsupported;
        };
        let ext = ext.to_ascii_lowercase();
        let ext = ext.as_str();

        if AUDIO_EXTENSIONS.contains(&ext) {
            FileKind::Audio
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            FileKind::Image
        } else if TEXT_EXTENSIONS.contains(&ext) {
            FileKind::Text
        } else {
            FileKind::Unsupported
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Audio => "audio",
            FileKind::Image => "image",
            FileKind::Text => "text",
            FileKind::Unsupported => "unsupported",
        }
    }
}

/// How processing of one file ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Stored(EventId),
    Unsupported,
    ExtractionFailed,
    StorageFailed,
}

pub struct Dispatcher {
    store: EventStore,
    audio: Option<Arc<dyn ContentExtractor>>,
    image: Option<Arc<dyn ContentExtractor>>,
    entities: Arc<dyn EntityExtractor>,
}

impl Dispatcher {
    pub fn new(store: EventStore) -> Self {
        Self {
            store,
            audio: None,
            image: None,
            entities: Arc::new(NoEntities),
        }
    }

    pub fn with_audio(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.audio = Some(extractor);
        self
    }

    pub fn with_image(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.image = Some(extractor);
        self
    }

    pub fn with_entities(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.entities = extractor;
        self
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Classify, extract and persist one file. Never returns an error; every
    /// failure is logged with the path and reported in the outcome.
    pub async fn dispatch(&self, path: &Path) -> DispatchOutcome {
        let kind = FileKind::classify(path);
        if kind == FileKind::Unsupported {
            warn!(path = %path.display(), "Unsupported file type, skipping");
            return DispatchOutcome::Unsupported;
        }

        let (extracted, payload) = match self.extract(kind, path).await {
            Ok(result) => result,
            Err(e) => {
                error!(path = %path.display(), kind = kind.as_str(), error = %e, "Extraction failed");
                return DispatchOutcome::ExtractionFailed;
            }
        };

        let record = ingestion_record(&extracted, payload);
        let id = self.store.create(&record).await;
        if id == CREATION_FAILED {
            error!(path = %path.display(), "Failed to store extracted event");
            return DispatchOutcome::StorageFailed;
        }

        info!(
            path = %path.display(),
            event_id = id,
            kind = kind.as_str(),
            file_processed = %extracted.file_processed.display(),
            "Stored event"
        );
        DispatchOutcome::Stored(id)
    }

    async fn extract(&self, kind: FileKind, path: &Path) -> Result<(ExtractedFile, Record), ExtractError> {
        let content = match kind {
            FileKind::Audio => Some(self.audio.clone().ok_or(ExtractError::NotConfigured { kind: "audio" })?),
            FileKind::Image => Some(self.image.clone().ok_or(ExtractError::NotConfigured { kind: "image" })?),
            FileKind::Text => None,
            FileKind::Unsupported => return Err(ExtractError::Other("unsupported file type".to_string())),
        };
        let entities = Arc::clone(&self.entities);
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(ExtractedFile, Record), ExtractError> {
            let extracted = match content {
                Some(extractor) => extractor.extract(&path)?,
                None => ExtractedFile::passthrough(&path),
            };
            let payload = entities.extract(&extracted.file_processed)?;
            Ok((extracted, payload))
        })
        .await
        .map_err(|e| ExtractError::Aborted(e.to_string()))?
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

/// The stored shape of a freshly ingested file.
pub fn ingestion_record(extracted: &ExtractedFile, payload: Record) -> Record {
    let mut record = Record::new();
    record.insert("file_original".to_string(), path_value(&extracted.file_original));
    record.insert("file_processed".to_string(), path_value(&extracted.file_processed));
    record.insert("schema_version".to_string(), Value::from(CURRENT_SCHEMA_VERSION));
    record.insert(EXTRACTION_COLUMN.to_string(), Value::Object(payload));
    record
}

impl StableFileHandler for Dispatcher {
    async fn on_stable(&self, path: PathBuf) -> anyhow::Result<()> {
        self.dispatch(&path).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(FileKind::classify(Path::new("a/voice.WAV")), FileKind::Audio);
        assert_eq!(FileKind::classify(Path::new("memo.m4a")), FileKind::Audio);
        assert_eq!(FileKind::classify(Path::new("scan.JPeG")), FileKind::Image);
        assert_eq!(FileKind::classify(Path::new("board.png")), FileKind::Image);
        assert_eq!(FileKind::classify(Path::new("note.txt")), FileKind::Text);
        assert_eq!(FileKind::classify(Path::new("report.pdf")), FileKind::Unsupported);
        assert_eq!(FileKind::classify(Path::new("Makefile")), FileKind::Unsupported);
        assert_eq!(FileKind::classify(Path::new(".txt")), FileKind::Unsupported);
    }

    #[test]
    fn test_ingestion_record_nests_payload() {
        let extracted = ExtractedFile {
            file_processed: PathBuf::from("/out/audio_1_abcdefgh.txt"),
            file_original: PathBuf::from("/in/a.wav"),
        };
        let mut payload = Record::new();
        payload.insert("dates".into(), json!(["2025-01-01"]));

        let record = ingestion_record(&extracted, payload);
        assert_eq!(
            Value::Object(record),
            json!({
                "file_original": "/in/a.wav",
                "file_processed": "/out/audio_1_abcdefgh.txt",
                "schema_version": 2,
                "ner_extract": {"dates": ["2025-01-01"]},
            })
        );
    }
}
