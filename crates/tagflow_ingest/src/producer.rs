use std::sync::Arc;
use tagflow_protocol::{decode_report, DecodeOptions, RawTagEntry};
use tracing::{debug, warn};

use crate::metrics::PipelineMetrics;
use crate::queue::{IngestQueue, QueueError};

/// Tag-report callback body: decode, count, enqueue. No I/O.
///
/// Runs on the reader client's own thread. Malformed entries are logged and
/// dropped one by one; the rest of the report still goes through.
#[derive(Clone)]
pub struct TagReportHandler {
    queue: Arc<IngestQueue>,
    metrics: Arc<PipelineMetrics>,
    options: DecodeOptions,
}

impl TagReportHandler {
    pub fn new(
        queue: Arc<IngestQueue>,
        metrics: Arc<PipelineMetrics>,
        options: DecodeOptions,
    ) -> Self {
        Self {
            queue,
            metrics,
            options,
        }
    }

    /// Handle one tag report. Returns the number of events enqueued.
    pub fn handle(&self, entries: &[RawTagEntry]) -> usize {
        self.metrics.inc_reports_received();
        let report = decode_report(entries, &self.options);

        for (index, err) in &report.rejected {
            warn!(entry = index, "Dropping malformed tag entry: {}", err);
        }
        self.metrics
            .add_entries_malformed(report.rejected.len() as u64);
        self.metrics.add_entries_decoded(report.events.len() as u64);
        self.metrics.add_tags_seen(
            report
                .events
                .iter()
                .map(|e| u64::from(e.seen_count()))
                .sum(),
        );

        let decoded = report.events.len();
        match self.queue.put_batch(report.events) {
            Ok(enqueued) => {
                self.metrics.add_events_enqueued(enqueued as u64);
                debug!(
                    entries = entries.len(),
                    enqueued,
                    "Tag report enqueued"
                );
                enqueued
            }
            Err(QueueError::Full { capacity, rejected }) => {
                let enqueued = decoded - rejected;
                self.metrics.add_events_enqueued(enqueued as u64);
                self.metrics.add_events_rejected_full(rejected as u64);
                warn!(
                    capacity,
                    rejected, "Ingest queue full, dropping tail of tag report"
                );
                enqueued
            }
        }
    }

    /// Wrap the handler as a callback suitable for a reader client.
    pub fn into_callback(self) -> impl Fn(&[RawTagEntry]) + Send + Sync + 'static {
        move |entries: &[RawTagEntry]| {
            self.handle(entries);
        }
    }
}
