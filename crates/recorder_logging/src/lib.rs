//! Shared logging setup for recorder binaries.
//!
//! Log lines go to stderr and to `<log_dir>/<YYYY-MM-DD>.log`. A new file is
//! started each calendar day; within a day the file is rotated by size.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "recorder=info,recorder_db=info";
const MAX_ROTATED_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by recorder binaries.
pub struct LogConfig<'a> {
    pub log_dir: &'a Path,
    /// Mirror the file filter on stderr instead of warnings only
    pub verbose: bool,
}

/// Initialize tracing with a dated file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    fs::create_dir_all(config.log_dir).with_context(|| {
        format!("Failed to create log directory: {}", config.log_dir.display())
    })?;
    let file_writer = SharedDatedWriter::new(config.log_dir.to_path_buf())
        .context("Failed to initialize log file writer")?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Global tracing subscriber already installed")?;

    Ok(())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Appends to `<dir>/<date>.log`, switching files when the date changes and
/// shifting `<date>.log.N` when the current file grows past `max_size`.
struct DatedFileAppender {
    dir: PathBuf,
    max_rotated: usize,
    max_size: u64,
    date: NaiveDate,
    file: Option<File>,
    current_size: u64,
}

impl DatedFileAppender {
    fn new(dir: PathBuf, date: NaiveDate, max_rotated: usize, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let mut appender = Self {
            dir,
            max_rotated,
            max_size,
            date,
            file: None,
            current_size: 0,
        };
        appender.reopen()?;
        if appender.current_size > appender.max_size {
            appender.rotate()?;
        }
        Ok(appender)
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.date.format("%Y-%m-%d")))
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}.log.{}", self.date.format("%Y-%m-%d"), index))
    }

    fn reopen(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        self.current_size = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Switch to a new day's file if `date` differs from the current one.
    fn roll_to(&mut self, date: NaiveDate) -> io::Result<()> {
        if date != self.date {
            self.date = date;
            self.reopen()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        if self.max_rotated > 0 {
            let oldest = self.rotated_path(self.max_rotated);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for idx in (1..self.max_rotated).rev() {
                let src = self.rotated_path(idx);
                if src.exists() {
                    fs::rename(&src, self.rotated_path(idx + 1))?;
                }
            }
            let current = self.current_path();
            if current.exists() {
                fs::rename(current, self.rotated_path(1))?;
            }
        } else {
            fs::remove_file(self.current_path())?;
        }

        self.reopen()
    }

    fn write_on(&mut self, date: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        self.roll_to(date)?;
        if self.current_size > 0 && self.current_size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let bytes = file.write(buf)?;
        self.current_size += bytes as u64;
        Ok(bytes)
    }
}

impl Write for DatedFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_on(today(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[derive(Clone)]
struct SharedDatedWriter {
    inner: Arc<Mutex<DatedFileAppender>>,
}

impl SharedDatedWriter {
    fn new(dir: PathBuf) -> Result<Self> {
        let appender = DatedFileAppender::new(dir.clone(), today(), MAX_ROTATED_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(appender)),
        })
    }
}

struct SharedDatedWriterGuard {
    inner: Arc<Mutex<DatedFileAppender>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedDatedWriter {
    type Writer = SharedDatedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedDatedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedDatedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}
