//! Per-sink projections of a [`TagEvent`].
//!
//! Each projection is derived deterministically from the event and never mutated
//! after it is written.

use tagflow_protocol::TagEvent;

/// Human-readable console line.
pub fn console_line(event: &TagEvent) -> String {
    format!(
        "[tag] EPC: {} | Antenna: {} | Ch: {} | RSSI: {} | Seen: {}x | Time: {}",
        event.epc(),
        opt(event.antenna()),
        opt(event.channel()),
        opt(event.peak_rssi()),
        event.seen_count(),
        event.last_seen_rfc3339(),
    )
}

/// Append-log fields in file order: timestamp, EPC, antenna, channel, seen count.
/// Absent values are empty fields.
pub fn log_fields(event: &TagEvent) -> [String; 5] {
    [
        event.last_seen_rfc3339(),
        event.epc().to_string(),
        event.antenna().map(|v| v.to_string()).unwrap_or_default(),
        event.channel().map(|v| v.to_string()).unwrap_or_default(),
        event.seen_count().to_string(),
    ]
}

/// One row of the flat tag table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub epc: String,
    pub antenna: Option<i64>,
    pub channel: Option<i64>,
    pub seen_count: i64,
    /// RFC3339, UTC, microsecond precision
    pub last_seen: String,
}

impl From<&TagEvent> for TagRow {
    fn from(event: &TagEvent) -> Self {
        Self {
            epc: event.epc().to_string(),
            antenna: event.antenna().map(i64::from),
            channel: event.channel().map(i64::from),
            seen_count: i64::from(event.seen_count()),
            last_seen: event.last_seen_rfc3339(),
        }
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
