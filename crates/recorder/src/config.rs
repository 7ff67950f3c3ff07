//! Configuration for the recorder pipeline

use crate::error::ConfigError;
use crate::extract::{ArtifactDir, CommandExtractor};
use crate::watcher::StabilityConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const HOME_ENV: &str = "RECORDER_HOME";
pub const UPLOAD_DIR_ENV: &str = "RECORDER_UPLOAD_DIR";
pub const DB_PATH_ENV: &str = "RECORDER_DB_PATH";

const CONFIG_FILE_NAME: &str = "config.toml";

/// `$RECORDER_HOME`, else `~/.recorder`, else `./.recorder`.
pub fn recorder_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|h| h.join(".recorder"))
        .unwrap_or_else(|| PathBuf::from(".recorder"))
}

pub fn default_config_path() -> PathBuf {
    recorder_home().join(CONFIG_FILE_NAME)
}

/// Main configuration for the recorder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub stability: StabilitySettings,

    #[serde(default)]
    pub extractors: ExtractorsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory watched for new files
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Where extracted text artifacts are written
    #[serde(default = "default_extracted_dir")]
    pub extracted_dir: PathBuf,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_upload_dir() -> PathBuf {
    recorder_home().join("uploads")
}

fn default_extracted_dir() -> PathBuf {
    recorder_home().join("extracted")
}

fn default_database_path() -> PathBuf {
    recorder_home().join("events.sqlite3")
}

fn default_log_dir() -> PathBuf {
    recorder_home().join("logs")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            extracted_dir: default_extracted_dir(),
            database_path: default_database_path(),
            log_dir: default_log_dir(),
        }
    }
}

/// Stability timing, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilitySettings {
    #[serde(default = "default_stable_secs")]
    pub stable_secs: f64,

    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: f64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

fn default_stable_secs() -> f64 {
    10.0
}

fn default_check_interval_secs() -> f64 {
    2.0
}

fn default_timeout_secs() -> f64 {
    300.0
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            stable_secs: default_stable_secs(),
            check_interval_secs: default_check_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn positive_secs(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("must be a positive number of seconds, got {}", secs),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}

impl StabilitySettings {
    pub fn to_stability_config(&self) -> Result<StabilityConfig, ConfigError> {
        let config = StabilityConfig {
            stable_for: positive_secs("stability.stable_secs", self.stable_secs)?,
            check_interval: positive_secs("stability.check_interval_secs", self.check_interval_secs)?,
            timeout: positive_secs("stability.timeout_secs", self.timeout_secs)?,
        };
        if config.timeout < config.stable_for {
            return Err(ConfigError::Invalid {
                field: "stability.timeout_secs",
                reason: "must not be shorter than stable_secs".to_string(),
            });
        }
        Ok(config)
    }
}

/// An external recognizer command. `{input}` in `args` is replaced by the
/// file path; without it the path is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn build(&self, artifacts: ArtifactDir, prefix: &str) -> CommandExtractor {
        CommandExtractor::new(self.program.clone(), self.args.clone(), artifacts, prefix)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractorsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<CommandSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<CommandSpec>,
}

impl RecorderConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` if it exists, otherwise defaults. Environment
    /// overrides are applied either way.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(UPLOAD_DIR_ENV).filter(|v| !v.is_empty()) {
            self.paths.upload_dir = PathBuf::from(dir);
        }
        if let Some(db) = lookup(DB_PATH_ENV).filter(|v| !v.is_empty()) {
            self.paths.database_path = PathBuf::from(db);
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            field: "config",
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
