use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tagflow_protocol::defaults::{DEFAULT_DRAIN_DEADLINE_MS, DEFAULT_POLL_INTERVAL_MS};
use tagflow_protocol::TagEvent;
use tagflow_sinks::SinkSet;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::buffer::RecencyBuffer;
use crate::cancel::CancellationToken;
use crate::dedup::{DedupDecision, DedupFilter, DedupPolicy, DedupReset};
use crate::metrics::PipelineMetrics;
use crate::queue::IngestQueue;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Failed to spawn consumer thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Consumer thread panicked")]
    Panicked,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub dedup: DedupPolicy,
    /// How long one `get` waits before re-checking for shutdown
    pub poll_interval: Duration,
    /// Upper bound on the shutdown drain
    pub drain_deadline: Duration,
    /// Only events with exactly this EPC are recorded
    pub epc_filter: Option<String>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            dedup: DedupPolicy::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            drain_deadline: Duration::from_millis(DEFAULT_DRAIN_DEADLINE_MS),
            epc_filter: None,
        }
    }
}

/// What the consumer did over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    /// Events taken off the queue and handled
    pub processed: u64,
    pub filtered: u64,
    pub duplicates: u64,
    /// Events handed to the sinks
    pub fanned_out: u64,
    pub sink_failures: u64,
    /// Events handled after shutdown was requested
    pub drained: u64,
    /// Events still queued when the drain deadline passed
    pub abandoned: u64,
}

/// The single consumer: drains the queue, updates history, dedups, fans out.
pub struct Consumer {
    queue: Arc<IngestQueue>,
    buffer: Arc<RecencyBuffer>,
    sinks: SinkSet,
    dedup: DedupFilter,
    metrics: Arc<PipelineMetrics>,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(
        queue: Arc<IngestQueue>,
        buffer: Arc<RecencyBuffer>,
        sinks: SinkSet,
        dedup_reset: DedupReset,
        metrics: Arc<PipelineMetrics>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            buffer,
            sinks,
            dedup: DedupFilter::new(config.dedup, dedup_reset),
            metrics,
            config,
        }
    }

    /// Start the consumer on its own thread.
    pub fn spawn(self) -> Result<ConsumerHandle, ConsumerError> {
        let cancel = CancellationToken::new();
        let thread_cancel = cancel.clone();
        let join_handle = std::thread::Builder::new()
            .name("tagflow-consumer".to_string())
            .spawn(move || self.run(thread_cancel))
            .map_err(ConsumerError::Spawn)?;
        Ok(ConsumerHandle {
            cancel,
            join_handle,
        })
    }

    /// Consumer loop. Returns once `cancel` is set and the queue is drained (or
    /// the drain deadline passed).
    pub fn run(mut self, cancel: CancellationToken) -> ConsumerReport {
        info!(
            sinks = ?self.sinks.names(),
            dedup = %self.config.dedup,
            "Consumer started"
        );
        let mut report = ConsumerReport::default();

        while !cancel.is_cancelled() {
            if let Some((event, generation)) = self
                .queue
                .get_with(self.config.poll_interval, || self.buffer.generation())
            {
                self.process(event, generation, &mut report);
            }
        }

        self.drain(&mut report);

        for failure in self.sinks.finish_all() {
            error!(sink = %failure.sink, "Failed to close sink: {}", failure.error);
        }
        info!(
            processed = report.processed,
            fanned_out = report.fanned_out,
            duplicates = report.duplicates,
            sink_failures = report.sink_failures,
            "Consumer stopped"
        );
        report
    }

    fn drain(&mut self, report: &mut ConsumerReport) {
        let deadline = Instant::now() + self.config.drain_deadline;
        let pending = self.queue.len();
        if pending > 0 {
            info!("Draining {} queued event(s) before exit", pending);
        }

        while let Some((event, generation)) =
            self.queue.try_get_with(|| self.buffer.generation())
        {
            if Instant::now() >= deadline {
                let abandoned = 1 + self.queue.clear() as u64;
                report.abandoned += abandoned;
                warn!(
                    abandoned,
                    "Drain deadline of {:?} reached, discarding remaining events",
                    self.config.drain_deadline
                );
                return;
            }
            self.process(event, generation, report);
            report.drained += 1;
        }
    }

    /// `generation` is the buffer generation read when the event left the queue.
    fn process(&mut self, event: TagEvent, generation: u64, report: &mut ConsumerReport) {
        self.metrics.inc_events_processed();
        report.processed += 1;

        if let Some(wanted) = &self.config.epc_filter {
            if event.epc() != wanted {
                self.metrics.inc_events_filtered();
                report.filtered += 1;
                debug!(epc = %event.epc(), "Filtered out");
                return;
            }
        }

        if !self.buffer.push_current(event.clone(), generation) {
            debug!(epc = %event.epc(), "Taken before a clear; kept out of history");
        }

        if self.dedup.check(&event) == DedupDecision::Duplicate {
            self.metrics.inc_duplicates_suppressed();
            report.duplicates += 1;
            debug!(epc = %event.epc(), "Duplicate suppressed");
            return;
        }

        let start = Instant::now();
        let failures = self.sinks.write_all(&event);
        self.metrics.record_sink_time(start);

        report.fanned_out += 1;
        report.sink_failures += failures.len() as u64;
        self.metrics
            .add_sink_writes((self.sinks.len() - failures.len()) as u64);
        self.metrics.add_sink_failures(failures.len() as u64);

        for failure in failures {
            error!(
                epc = %event.epc(),
                sink = %failure.sink,
                "Sink write failed: {}",
                failure.error
            );
        }
    }
}

/// Handle to a running consumer thread.
pub struct ConsumerHandle {
    cancel: CancellationToken,
    join_handle: JoinHandle<ConsumerReport>,
}

impl ConsumerHandle {
    /// Signal the consumer, wait for the drain, and collect its report.
    pub fn shutdown(self) -> Result<ConsumerReport, ConsumerError> {
        self.cancel.cancel_with("shutdown");
        self.join_handle
            .join()
            .map_err(|_| ConsumerError::Panicked)
    }
}
