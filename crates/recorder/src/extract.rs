//! Content and entity extractor seams.
//!
//! The recognition algorithms live outside this crate. A content extractor
//! turns an audio or image file into a text artifact; an entity extractor
//! turns that text into the structured extraction payload. Both are
//! synchronous and may block, so callers run them on a blocking thread.

use crate::error::ExtractError;
use recorder_db::Record;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Placeholder in command arguments replaced by the input path.
pub const INPUT_PLACEHOLDER: &str = "{input}";

const RANDOM_SUFFIX_LEN: usize = 8;

/// Paths returned by a content extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub file_processed: PathBuf,
    pub file_original: PathBuf,
}

impl ExtractedFile {
    /// Text inputs need no extraction; the file is both original and processed.
    pub fn passthrough(path: &Path) -> Self {
        Self {
            file_processed: path.to_path_buf(),
            file_original: path.to_path_buf(),
        }
    }
}

pub trait ContentExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedFile, ExtractError>;
}

/// Produces the extraction payload for a text artifact.
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text_path: &Path) -> Result<Record, ExtractError>;
}

/// Fallback entity extractor: the whole text becomes `events_full`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEntities;

impl EntityExtractor for NoEntities {
    fn extract(&self, text_path: &Path) -> Result<Record, ExtractError> {
        let text = fs::read_to_string(text_path)?;
        let events_full: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();

        let mut payload = Record::new();
        payload.insert("events_full".to_string(), Value::String(events_full));
        Ok(payload)
    }
}

/// Output directory for extracted text artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `text` under a fresh collision-resistant name and return its path.
    pub fn write_text(&self, prefix: &str, text: &str) -> Result<PathBuf, ExtractError> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(unique_artifact_name(prefix));
        fs::write(&path, text)?;
        debug!(path = %path.display(), bytes = text.len(), "Wrote text artifact");
        Ok(path)
    }
}

/// `<prefix>_<unix-seconds>_<8 random alphanumerics>.txt`
pub fn unique_artifact_name(prefix: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}.txt", prefix, secs, &random[..RANDOM_SUFFIX_LEN])
}

/// Runs an external recognizer and stores its stdout as a text artifact.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
    artifacts: ArtifactDir,
    prefix: String,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>, artifacts: ArtifactDir, prefix: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            artifacts,
            prefix: prefix.into(),
        }
    }

    /// Arguments with `{input}` substituted; the path is appended when no
    /// argument mentions the placeholder.
    fn command_args(&self, input: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        if self.args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            self.args
                .iter()
                .map(|a| a.replace(INPUT_PLACEHOLDER, &input))
                .collect()
        } else {
            let mut args = self.args.clone();
            args.push(input.into_owned());
            args
        }
    }
}

impl ContentExtractor for CommandExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedFile, ExtractError> {
        let args = self.command_args(path);
        debug!(program = %self.program, ?args, "Running extractor");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| ExtractError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let file_processed = self.artifacts.write_text(&self.prefix, text.trim_end())?;
        Ok(ExtractedFile {
            file_processed,
            file_original: path.to_path_buf(),
        })
    }
}
