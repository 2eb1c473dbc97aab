use std::io::{self, Write};
use tagflow_protocol::TagEvent;
use tracing::warn;

use crate::{record, SinkResult, TagSink};

/// Prints one line per event. Never fails the pipeline: write errors are logged
/// and swallowed.
pub struct ConsoleSink {
    out: Box<dyn Write + Send>,
    lines_written: u64,
}

impl ConsoleSink {
    /// Console sink on stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            lines_written: 0,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

impl TagSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn write(&mut self, event: &TagEvent) -> SinkResult<()> {
        let line = record::console_line(event);
        match writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            Ok(()) => self.lines_written += 1,
            Err(err) => warn!(epc = %event.epc(), "Console write failed (ignored): {}", err),
        }
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<()> {
        if let Err(err) = self.out.flush() {
            warn!("Console flush failed (ignored): {}", err);
        }
        Ok(())
    }
}
