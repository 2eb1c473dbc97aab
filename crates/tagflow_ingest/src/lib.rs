//! Tag ingestion pipeline.
//!
//! ```text
//! reader thread                      consumer thread
//! ─────────────                      ───────────────
//! TagReportHandler ── put_batch ──▶ IngestQueue ── get(timeout) ──▶ Consumer
//!   (decode only)                                                   │ epc filter
//!                                                                   │ RecencyBuffer::push
//!                                                                   │ DedupFilter::check
//!                                                                   ▼ SinkSet::write_all
//! ```
//!
//! The producer never does I/O. The consumer owns the dedup set and is the only
//! writer of the recency buffer; the control plane talks to it only through
//! [`DedupReset`], [`RecencyBuffer::clear`] and [`IngestQueue::clear`], none of
//! which wait on the consumer.

pub mod buffer;
pub mod cancel;
pub mod consumer;
pub mod dedup;
pub mod metrics;
pub mod producer;
pub mod queue;

pub use buffer::RecencyBuffer;
pub use cancel::CancellationToken;
pub use consumer::{Consumer, ConsumerConfig, ConsumerError, ConsumerHandle, ConsumerReport};
pub use dedup::{DedupDecision, DedupFilter, DedupPolicy, DedupReset};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use producer::TagReportHandler;
pub use queue::{IngestQueue, QueueError};
