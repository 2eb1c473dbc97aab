//! Shared logging utilities for tagflow binaries.
//!
//! Diagnostics go to stderr and to a size-rotated file under `~/.tagflow/logs`.
//! Stdout is left to the operator prompt and the console sink.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "tagflow=info,tagflow_ingest=info,tagflow_control=info,tagflow_sinks=info,tagflow_protocol=info";
const VERBOSE_LOG_FILTER: &str =
    "tagflow=debug,tagflow_ingest=debug,tagflow_control=debug,tagflow_sinks=debug,tagflow_protocol=debug";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by tagflow binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// A log directory that cannot be created degrades to stderr-only logging; the
/// returned path is `None` in that case.
pub fn init_logging(config: LogConfig<'_>) -> Result<Option<PathBuf>> {
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let (file_layer, log_dir, file_error) = match ensure_logs_dir()
        .and_then(|dir| Ok((FileWriter::open(dir.clone(), config.app_name)?, dir)))
    {
        Ok((writer, dir)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            ),
            Some(dir),
            None,
        ),
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(err) = file_error {
        tracing::warn!("File logging disabled: {:#}", err);
    }

    Ok(log_dir)
}

/// Get the tagflow home directory: ~/.tagflow
pub fn tagflow_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("TAGFLOW_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tagflow")
}

/// Get the logs directory: ~/.tagflow/logs
pub fn logs_dir() -> PathBuf {
    tagflow_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Size-based rotation: `<name>.log` is live, `<name>.log.1` the most recent
/// rotated file, up to `max_files` files in total.
#[derive(Debug, Clone, Copy)]
struct Rotation {
    max_files: usize,
    max_bytes: u64,
}

struct LogFile {
    dir: PathBuf,
    name: String,
    rotation: Rotation,
    file: File,
    len: u64,
}

impl LogFile {
    fn open(dir: PathBuf, name: &str, rotation: Rotation) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let name = file_stem(name);
        let (file, len) = open_append(&dir.join(format!("{}.log", name)))?;
        let mut log = Self {
            dir,
            name,
            rotation: Rotation {
                max_files: rotation.max_files.max(1),
                ..rotation
            },
            file,
            len,
        };
        if log.len > log.rotation.max_bytes {
            log.rotate()?;
        }
        Ok(log)
    }

    fn path(&self, generation: usize) -> PathBuf {
        match generation {
            0 => self.dir.join(format!("{}.log", self.name)),
            n => self.dir.join(format!("{}.log.{}", self.name, n)),
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let oldest = self.rotation.max_files - 1;
        let doomed = self.path(oldest);
        if doomed.exists() {
            fs::remove_file(&doomed)?;
        }
        for generation in (0..oldest).rev() {
            let from = self.path(generation);
            if from.exists() {
                fs::rename(&from, self.path(generation + 1))?;
            }
        }
        let (file, len) = open_append(&self.path(0))?;
        self.file = file;
        self.len = len;
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.len > 0 && self.len + buf.len() as u64 > self.rotation.max_bytes {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.len += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect()
}

/// `MakeWriter` handing every event the same locked [`LogFile`].
#[derive(Clone)]
struct FileWriter(Arc<Mutex<LogFile>>);

impl FileWriter {
    fn open(dir: PathBuf, name: &str) -> Result<Self> {
        let rotation = Rotation {
            max_files: MAX_LOG_FILES,
            max_bytes: MAX_LOG_FILE_SIZE,
        };
        let log = LogFile::open(dir, name, rotation)
            .with_context(|| format!("Failed to open log file for {}", name))?;
        Ok(Self(Arc::new(Mutex::new(log))))
    }

    fn lock(&self) -> MutexGuard<'_, LogFile> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FileWriter {
    type Writer = FileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}
