//! Session context: owns the pipeline for one reader connection.
//!
//! Startup order matters: everything that can fail on bad input (config, output
//! paths) fails before any thread exists.

use std::io::Write;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tagflow_control::{
    ClearPolicy, ControlError, Outcome, PipelineHandles, ReaderClient, ReaderControl,
    ReaderEvent, SessionState,
};
use tagflow_ingest::{
    Consumer, ConsumerConfig, ConsumerHandle, ConsumerReport, DedupReset, IngestQueue,
    MetricsSnapshot, PipelineMetrics, RecencyBuffer, TagReportHandler,
};
use tagflow_protocol::{DecodeOptions, TagEvent};
use tagflow_sinks::{AppendLogSink, ConsoleSink, DatabaseSink, SinkSet};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, OutputConfig};
use crate::error::StartupError;

/// Open every configured sink, in fan-out order (console, append log, database).
pub fn open_sinks(
    output: &OutputConfig,
    console: impl Write + Send + 'static,
) -> Result<SinkSet, StartupError> {
    let console = output.console.then(|| ConsoleSink::new(console));

    let append_log = match &output.log_file {
        Some(path) => Some(AppendLogSink::open(path).map_err(|source| StartupError::Sink {
            sink: "append-log",
            path: path.clone(),
            source,
        })?),
        None => None,
    };

    let database = match &output.database {
        Some(path) => Some(
            DatabaseSink::open(path, &output.table).map_err(|source| StartupError::Sink {
                sink: "database",
                path: path.clone(),
                source,
            })?,
        ),
        None => None,
    };

    let sinks = SinkSet::standard(console, append_log, database);
    if sinks.is_empty() {
        warn!("No outputs enabled; tags will only be kept in memory");
    }
    Ok(sinks)
}

/// Final accounting returned by [`Session::shutdown`].
#[derive(Debug)]
pub struct ShutdownReport {
    pub consumer: Option<ConsumerReport>,
    pub metrics: MetricsSnapshot,
}

/// Running pipeline plus the control facade in front of the reader.
pub struct Session {
    control: Arc<ReaderControl>,
    pipeline: PipelineHandles,
    metrics: Arc<PipelineMetrics>,
    consumer: ConsumerHandle,
}

impl Session {
    /// Wire callbacks, connect, then spawn the consumer.
    ///
    /// A failed connect returns before the consumer thread is spawned.
    pub fn start(
        config: &AppConfig,
        client: Arc<dyn ReaderClient>,
        sinks: SinkSet,
    ) -> Result<Self, StartupError> {
        let pipeline = PipelineHandles {
            buffer: Arc::new(RecencyBuffer::new(config.pipeline.history_capacity)),
            queue: Arc::new(IngestQueue::new(config.pipeline.queue_capacity)),
            dedup_reset: DedupReset::new(),
        };
        let metrics = Arc::new(PipelineMetrics::new());

        let control = Arc::new(ReaderControl::new(
            Arc::clone(&client),
            config.endpoint.clone(),
            config.reader.clone(),
            pipeline.clone(),
            ClearPolicy {
                reset_dedup: config.pipeline.clear_resets_dedup,
                discard_queued: config.pipeline.clear_discards_queued,
            },
        ));

        let handler = TagReportHandler::new(
            Arc::clone(&pipeline.queue),
            Arc::clone(&metrics),
            DecodeOptions {
                prefer_reader_clock: config.pipeline.prefer_reader_clock,
            },
        );
        client.register_tag_report_callback(Box::new(handler.into_callback()));
        client.register_event_callback(Box::new(event_listener(
            Arc::downgrade(&control),
            config.gpi_start_port,
        )));

        control.connect().map_err(StartupError::Connect)?;

        let consumer = Consumer::new(
            Arc::clone(&pipeline.queue),
            Arc::clone(&pipeline.buffer),
            sinks,
            pipeline.dedup_reset.clone(),
            Arc::clone(&metrics),
            ConsumerConfig {
                dedup: config.pipeline.dedup,
                poll_interval: Duration::from_millis(config.pipeline.poll_interval_ms),
                drain_deadline: Duration::from_millis(config.pipeline.drain_deadline_ms),
                epc_filter: config.pipeline.epc_filter.clone(),
            },
        );
        let consumer = match consumer.spawn() {
            Ok(handle) => handle,
            Err(err) => {
                if let Err(shutdown_err) = control.shutdown() {
                    warn!("Reader shutdown after failed start: {}", shutdown_err);
                }
                return Err(StartupError::Consumer(err));
            }
        };

        info!(
            reader = %config.endpoint,
            dedup = %config.pipeline.dedup,
            history = config.pipeline.history_capacity,
            "Session started"
        );
        Ok(Self {
            control,
            pipeline,
            metrics,
            consumer,
        })
    }

    pub fn control(&self) -> &Arc<ReaderControl> {
        &self.control
    }

    pub fn state(&self) -> SessionState {
        self.control.session_state()
    }

    /// Recency buffer snapshot, oldest first.
    pub fn history(&self) -> Vec<TagEvent> {
        self.pipeline.buffer.snapshot()
    }

    pub fn history_capacity(&self) -> usize {
        self.pipeline.buffer.capacity()
    }

    pub fn queued(&self) -> usize {
        self.pipeline.queue.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop and disconnect the reader, then drain and join the consumer.
    pub fn shutdown(self) -> ShutdownReport {
        match self.control.shutdown() {
            Ok(outcome) => debug!("Reader shutdown: {}", outcome),
            Err(err) => warn!("Reader shutdown incomplete: {}", err),
        }

        let consumer = match self.consumer.shutdown() {
            Ok(report) => {
                if report.abandoned > 0 {
                    warn!(
                        "{} event(s) were not recorded before the drain deadline",
                        report.abandoned
                    );
                }
                Some(report)
            }
            Err(err) => {
                error!("Consumer did not shut down cleanly: {}", err);
                None
            }
        };

        let metrics = self.metrics.snapshot();
        info!("{}", metrics.summary());
        ShutdownReport { consumer, metrics }
    }
}

/// Reader event handling: log connection changes, start inventory on a GPI edge.
fn event_listener(
    control: Weak<ReaderControl>,
    gpi_start_port: Option<u16>,
) -> impl Fn(&ReaderEvent) + Send + Sync + 'static {
    move |event: &ReaderEvent| match event {
        ReaderEvent::ConnectionAttempt { status } => {
            info!("Reader connection attempt: {}", status)
        }
        ReaderEvent::Disconnected => warn!("Reader reported disconnect"),
        ReaderEvent::Gpi { port, high } if *high && Some(*port) == gpi_start_port => {
            let Some(control) = control.upgrade() else {
                return;
            };
            info!(port, "GPI trigger, starting inventory");
            // Off the reader's callback thread: start() calls back into the client.
            let spawned = std::thread::Builder::new()
                .name("tagflow-gpi".to_string())
                .spawn(move || log_gpi_start(control.start()));
            if let Err(err) = spawned {
                error!("Failed to handle GPI trigger: {}", err);
            }
        }
        other => debug!("Reader event: {}", other),
    }
}

fn log_gpi_start(result: Result<Outcome, ControlError>) {
    match result {
        Ok(outcome) => info!("GPI start: {}", outcome),
        Err(err) => warn!("GPI start rejected: {}", err),
    }
}
