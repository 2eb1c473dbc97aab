//! Persistence and display targets for processed tag events.
//!
//! Every sink implements [`TagSink`]. A [`SinkSet`] holds the configured sinks in a
//! fixed order and fans one event out to all of them:
//! - a failure in one sink is returned to the caller, never short-circuits the rest
//! - sinks never see each other's state
//!
//! Built-in variants:
//! - [`ConsoleSink`]: human-readable line, write errors swallowed
//! - [`AppendLogSink`]: one CSV line per event, file opened in append mode per write
//! - [`DatabaseSink`]: one SQLite row per event, one transaction per insert

use std::path::PathBuf;
use tagflow_protocol::TagEvent;
use thiserror::Error;
use tracing::{debug, info};

mod append_log;
mod console;
mod database;
pub mod record;

pub use append_log::AppendLogSink;
pub use console::ConsoleSink;
pub use database::DatabaseSink;
pub use record::TagRow;

/// Errors returned by sink setup and writes.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{message}")]
    Message { message: String },
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl SinkError {
    pub fn message(message: impl Into<String>) -> Self {
        SinkError::Message {
            message: message.into(),
        }
    }
}

/// Capability shared by every sink: accept one event at a time.
pub trait TagSink: Send {
    /// Short stable name used in logs ("console", "append_log", "database").
    fn name(&self) -> &str;

    /// Persist or display one event.
    fn write(&mut self, event: &TagEvent) -> SinkResult<()>;

    /// Flush and release resources. Called once when the pipeline stops.
    fn finish(&mut self) -> SinkResult<()> {
        Ok(())
    }
}

/// A sink write that failed for one event.
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: String,
    pub error: SinkError,
}

/// Ordered collection of sinks.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn TagSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Standard fan-out order: console, then append log, then database.
    pub fn standard(
        console: Option<ConsoleSink>,
        append_log: Option<AppendLogSink>,
        database: Option<DatabaseSink>,
    ) -> Self {
        let mut set = Self::new();
        if let Some(sink) = console {
            set.push(sink);
        }
        if let Some(sink) = append_log {
            set.push(sink);
        }
        if let Some(sink) = database {
            set.push(sink);
        }
        set
    }

    /// Append a sink after the existing ones.
    pub fn push(&mut self, sink: impl TagSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Write one event to every sink in order. Each sink runs regardless of
    /// earlier failures; the failures are returned.
    pub fn write_all(&mut self, event: &TagEvent) -> Vec<SinkFailure> {
        let mut failures = Vec::new();
        for sink in self.sinks.iter_mut() {
            match sink.write(event) {
                Ok(()) => debug!(sink = sink.name(), epc = %event.epc(), "Sink write ok"),
                Err(error) => failures.push(SinkFailure {
                    sink: sink.name().to_string(),
                    error,
                }),
            }
        }
        failures
    }

    /// Finish every sink, collecting failures.
    pub fn finish_all(&mut self) -> Vec<SinkFailure> {
        let mut failures = Vec::new();
        for sink in self.sinks.iter_mut() {
            match sink.finish() {
                Ok(()) => info!(sink = sink.name(), "Sink closed"),
                Err(error) => failures.push(SinkFailure {
                    sink: sink.name().to_string(),
                    error,
                }),
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl TagSink for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn write(&mut self, event: &TagEvent) -> SinkResult<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.epc()));
            if self.fail {
                return Err(SinkError::message("boom"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_write_all_runs_every_sink_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = SinkSet::new();
        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            set.push(Recording {
                name,
                log: log.clone(),
                fail,
            });
        }

        let event = TagEvent::new("E1", 1, 0).unwrap();
        let failures = set.write_all(&event);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:E1", "second:E1", "third:E1"]
        );
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].sink, "second");
        assert_eq!(set.names(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_set() {
        let mut set = SinkSet::new();
        assert!(set.is_empty());
        assert!(set.write_all(&TagEvent::new("E1", 1, 0).unwrap()).is_empty());
        assert!(set.finish_all().is_empty());
    }
}
