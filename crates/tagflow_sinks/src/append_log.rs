use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tagflow_protocol::TagEvent;
use tracing::{debug, info};

use crate::{record, SinkError, SinkResult, TagSink};

/// Appends one comma-delimited line per event:
/// `timestamp,epc,antenna,channel,seen_count`.
///
/// The file is opened in append mode for every write and closed when the write
/// scope ends, including on error. Every line is flushed before `write` returns.
pub struct AppendLogSink {
    path: PathBuf,
    lines_written: u64,
}

impl AppendLogSink {
    /// Create the sink, verifying up front that the path is writable.
    pub fn open(path: impl Into<PathBuf>) -> SinkResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Open {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        open_append(&path)?;
        info!("Initializing append-log sink: {}", path.display());
        Ok(Self {
            path,
            lines_written: 0,
        })
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

fn open_append(path: &Path) -> SinkResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })
}

impl TagSink for AppendLogSink {
    fn name(&self) -> &str {
        "append_log"
    }

    fn write(&mut self, event: &TagEvent) -> SinkResult<()> {
        let file = open_append(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(record::log_fields(event))?;
        writer.flush()?;
        self.lines_written += 1;
        debug!(
            "Appended {} to {} (total: {})",
            event.epc(),
            self.path.display(),
            self.lines_written
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_log_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("tag_reads.txt");
        let mut sink = AppendLogSink::open(&path).unwrap();

        sink.write(
            &TagEvent::new("E1", 1, 1_700_000_000_000_000)
                .unwrap()
                .with_antenna(1)
                .with_channel(3),
        )
        .unwrap();
        sink.write(&TagEvent::new("E2", 7, 1_700_000_000_000_001).unwrap())
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "2023-11-14T22:13:20.000000Z,E1,1,3,1\n2023-11-14T22:13:20.000001Z,E2,,,7\n"
        );
        assert_eq!(sink.lines_written(), 2);
    }

    #[test]
    fn test_append_log_keeps_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tag_reads.txt");
        std::fs::write(&path, "earlier,line,,,1\n").unwrap();

        let mut sink = AppendLogSink::open(&path).unwrap();
        sink.write(&TagEvent::new("E9", 1, 0).unwrap()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("earlier,line,,,1\n"));
        assert!(content.ends_with(",E9,,,1\n"));
    }

    #[test]
    fn test_unwritable_path_fails_at_open() {
        let dir = tempdir().unwrap();
        // a directory cannot be opened for appending
        let result = AppendLogSink::open(dir.path());
        assert!(matches!(result, Err(SinkError::Open { .. })));
    }

    #[test]
    fn test_write_fails_when_file_becomes_unwritable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        let mut sink = AppendLogSink::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(sink.write(&TagEvent::new("E1", 1, 0).unwrap()).is_err());
        assert_eq!(sink.lines_written(), 0);
    }
}
