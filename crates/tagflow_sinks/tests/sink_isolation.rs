//! A failing sink must not starve its siblings.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tagflow_protocol::TagEvent;
use tagflow_sinks::{AppendLogSink, ConsoleSink, SinkError, SinkResult, SinkSet, TagSink};
use tempfile::tempdir;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Database stand-in that rejects one EPC.
struct FlakyDatabase {
    reject_epc: &'static str,
    accepted: Arc<Mutex<Vec<String>>>,
}

impl TagSink for FlakyDatabase {
    fn name(&self) -> &str {
        "database"
    }

    fn write(&mut self, event: &TagEvent) -> SinkResult<()> {
        if event.epc() == self.reject_epc {
            return Err(SinkError::message("database is locked"));
        }
        self.accepted.lock().unwrap().push(event.epc().to_string());
        Ok(())
    }
}

#[test]
fn test_database_failure_does_not_block_console_or_file() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("tag_reads.txt");
    let console_out = SharedBuf::default();
    let accepted = Arc::new(Mutex::new(Vec::new()));

    let mut sinks = SinkSet::standard(
        Some(ConsoleSink::new(console_out.clone())),
        Some(AppendLogSink::open(&log_path).unwrap()),
        None,
    );
    sinks.push(FlakyDatabase {
        reject_epc: "E1",
        accepted: accepted.clone(),
    });
    assert_eq!(sinks.names(), vec!["console", "append_log", "database"]);

    let first = TagEvent::new("E1", 1, 1_700_000_000_000_000).unwrap();
    let second = TagEvent::new("E2", 1, 1_700_000_000_000_000).unwrap();

    let failures = sinks.write_all(&first);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].sink, "database");

    let failures = sinks.write_all(&second);
    assert!(failures.is_empty());
    assert!(sinks.finish_all().is_empty());

    let console = console_out.text();
    assert!(console.contains("EPC: E1"));
    assert!(console.contains("EPC: E2"));

    let log = std::fs::read_to_string(&log_path).unwrap();
    let epcs: Vec<&str> = log
        .lines()
        .map(|line| line.split(',').nth(1).unwrap())
        .collect();
    assert_eq!(epcs, vec!["E1", "E2"]);

    assert_eq!(*accepted.lock().unwrap(), vec!["E2"]);
}
