//! Boundary to the reader-protocol client.
//!
//! The protocol implementation (handshake, framing, RO-spec negotiation) lives
//! behind [`ReaderClient`]. The client owns its own I/O thread and calls the
//! registered callbacks from it.

use std::fmt;
use tagflow_protocol::{RawTagEntry, ReaderConfig, ReaderEndpoint};
use thiserror::Error;

/// Invoked with every tag report, on the client's thread.
pub type TagReportCallback = Box<dyn Fn(&[RawTagEntry]) + Send + Sync>;

/// Invoked with connection and GPI events, on the client's thread.
pub type ReaderEventCallback = Box<dyn Fn(&ReaderEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Reader is not connected")]
    NotConnected,

    #[error("Reader connection lost")]
    ConnectionLost,

    #[error("Reader rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("Reader I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Asynchronous notification from the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// Outcome of the reader's connection-attempt event ("Success", "Failed_Reason", ...)
    ConnectionAttempt { status: String },
    /// The transport closed.
    Disconnected,
    /// General-purpose input changed level.
    Gpi { port: u16, high: bool },
    Other(String),
}

impl fmt::Display for ReaderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderEvent::ConnectionAttempt { status } => {
                write!(f, "connection attempt: {}", status)
            }
            ReaderEvent::Disconnected => write!(f, "disconnected"),
            ReaderEvent::Gpi { port, high } => write!(
                f,
                "GPI {} {}",
                port,
                if *high { "high" } else { "low" }
            ),
            ReaderEvent::Other(text) => write!(f, "{}", text),
        }
    }
}

/// Client-side state token with a human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderState {
    pub name: String,
}

impl ReaderState {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Control surface of a reader-protocol client.
///
/// Implementations are internally synchronized: every method takes `&self` and may
/// be called from any thread.
pub trait ReaderClient: Send + Sync {
    fn connect(&self, endpoint: &ReaderEndpoint, config: &ReaderConfig) -> Result<(), ReaderError>;

    fn disconnect(&self) -> Result<(), ReaderError>;

    fn is_alive(&self) -> bool;

    fn start_inventory(&self) -> Result<(), ReaderError>;

    fn stop_inventory(&self) -> Result<(), ReaderError>;

    fn current_state(&self) -> ReaderState;

    fn register_tag_report_callback(&self, callback: TagReportCallback);

    fn register_event_callback(&self, callback: ReaderEventCallback);
}
