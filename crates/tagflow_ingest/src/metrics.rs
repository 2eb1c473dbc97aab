//! Pipeline counters.
//!
//! Lock-free atomics shared by the producer callback, the consumer thread and the
//! command loop. Every counter is monotonic for the life of the process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    // Producer side
    pub reports_received: AtomicU64,
    pub entries_decoded: AtomicU64,
    pub entries_malformed: AtomicU64,
    pub events_enqueued: AtomicU64,
    pub events_rejected_full: AtomicU64,
    /// Sum of reader seen-counts over decoded entries
    pub tags_seen: AtomicU64,

    // Consumer side
    pub events_processed: AtomicU64,
    pub events_filtered: AtomicU64,
    pub duplicates_suppressed: AtomicU64,
    pub sink_writes: AtomicU64,
    pub sink_failures: AtomicU64,
    pub sink_time_us: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_reports_received(&self) {
        self.reports_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_entries_decoded(&self, n: u64) {
        self.entries_decoded.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_entries_malformed(&self, n: u64) {
        self.entries_malformed.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_events_enqueued(&self, n: u64) {
        self.events_enqueued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_events_rejected_full(&self, n: u64) {
        self.events_rejected_full.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_tags_seen(&self, n: u64) {
        self.tags_seen.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_filtered(&self) {
        self.events_filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_duplicates_suppressed(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_sink_writes(&self, n: u64) {
        self.sink_writes.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_sink_failures(&self, n: u64) {
        self.sink_failures.fetch_add(n, Ordering::Relaxed);
    }

    /// Record time spent fanning one event out to the sinks
    #[inline]
    pub fn record_sink_time(&self, start: Instant) {
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.sink_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reports_received: self.reports_received.load(Ordering::Relaxed),
            entries_decoded: self.entries_decoded.load(Ordering::Relaxed),
            entries_malformed: self.entries_malformed.load(Ordering::Relaxed),
            events_enqueued: self.events_enqueued.load(Ordering::Relaxed),
            events_rejected_full: self.events_rejected_full.load(Ordering::Relaxed),
            tags_seen: self.tags_seen.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_filtered: self.events_filtered.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            sink_writes: self.sink_writes.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            sink_time_us: self.sink_time_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub reports_received: u64,
    pub entries_decoded: u64,
    pub entries_malformed: u64,
    pub events_enqueued: u64,
    pub events_rejected_full: u64,
    pub tags_seen: u64,
    pub events_processed: u64,
    pub events_filtered: u64,
    pub duplicates_suppressed: u64,
    pub sink_writes: u64,
    pub sink_failures: u64,
    pub sink_time_us: u64,
}

impl MetricsSnapshot {
    /// Average fan-out time per processed event in milliseconds
    pub fn avg_sink_time_ms(&self) -> f64 {
        let fanned_out = self
            .events_processed
            .saturating_sub(self.events_filtered)
            .saturating_sub(self.duplicates_suppressed);
        if fanned_out == 0 {
            0.0
        } else {
            (self.sink_time_us as f64 / fanned_out as f64) / 1000.0
        }
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Reports: {} received, {} entries decoded, {} malformed | \
             Queue: {} enqueued, {} rejected | \
             Consumer: {} processed, {} filtered, {} duplicates | \
             Sinks: {} writes, {} failures, avg {:.2}ms | \
             Total tags seen: {}",
            self.reports_received,
            self.entries_decoded,
            self.entries_malformed,
            self.events_enqueued,
            self.events_rejected_full,
            self.events_processed,
            self.events_filtered,
            self.duplicates_suppressed,
            self.sink_writes,
            self.sink_failures,
            self.avg_sink_time_ms(),
            self.tags_seen,
        )
    }
}
