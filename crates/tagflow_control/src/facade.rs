//! Reader control facade.
//!
//! Serializes operator (and GPI-triggered) commands over a [`ReaderClient`] with a
//! small session state machine:
//!
//! ```text
//! Disconnected ──connect──▶ Connected(Idle) ──start──▶ Connected(Running)
//!      ▲                          ▲   │                     │
//!      │                          │   └─────────────────────┤
//!      └────────disconnect────────┴──────────stop───────────┘
//! ```
//!
//! The facade never waits on the consumer. It reaches pipeline state only through
//! [`RecencyBuffer::clear`], [`DedupReset::request`] and the explicit
//! [`ReaderControl::clear_queue`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tagflow_ingest::{DedupReset, IngestQueue, RecencyBuffer};
use tagflow_protocol::{ReaderConfig, ReaderEndpoint};
use thiserror::Error;
use tracing::{info, warn};

use crate::client::{ReaderClient, ReaderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected(InventoryState),
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connected(InventoryState::Idle) => write!(f, "connected (idle)"),
            SessionState::Connected(InventoryState::Running) => write!(f, "connected (running)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    /// Command needs a reader session and there is none.
    #[error("Cannot {command}: not connected to a reader")]
    NotConnected { command: &'static str },

    #[error("Cannot {command} while {state}")]
    InvalidTransition {
        command: &'static str,
        state: SessionState,
    },

    #[error("{command} failed: {source}")]
    Connection {
        command: &'static str,
        #[source]
        source: ReaderError,
    },
}

impl ControlError {
    /// Rejected without side effects (as opposed to a reader failure).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ControlError::NotConnected { .. } | ControlError::InvalidTransition { .. }
        )
    }
}

/// What `clear` touches besides the recency history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearPolicy {
    pub reset_dedup: bool,
    pub discard_queued: bool,
}

impl Default for ClearPolicy {
    fn default() -> Self {
        Self {
            reset_dedup: true,
            discard_queued: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearSummary {
    pub history_cleared: usize,
    pub queued_discarded: usize,
    pub dedup_reset: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateReport {
    pub session: SessionState,
    /// Reader's own state name; only available while connected
    pub reader_state: Option<String>,
}

/// Result of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Transitioned {
        from: SessionState,
        to: SessionState,
    },
    /// Command was valid but the session was already there (e.g. a second `start`).
    Unchanged(SessionState),
    Cleared(ClearSummary),
    State(StateReport),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Transitioned { to, .. } => write!(f, "Reader {}", to),
            Outcome::Unchanged(state) => write!(f, "Reader already {}", state),
            Outcome::Cleared(summary) => {
                write!(f, "Tag data cleared ({} in history", summary.history_cleared)?;
                if summary.queued_discarded > 0 {
                    write!(f, ", {} queued discarded", summary.queued_discarded)?;
                }
                if summary.dedup_reset {
                    write!(f, ", dedup reset")?;
                }
                write!(f, ")")
            }
            Outcome::State(report) => match &report.reader_state {
                Some(name) => write!(f, "Session {} | Reader state: {}", report.session, name),
                None => write!(f, "Session {}", report.session),
            },
        }
    }
}

pub type ControlResult = Result<Outcome, ControlError>;

/// Pipeline handles the facade may reset.
#[derive(Clone)]
pub struct PipelineHandles {
    pub buffer: Arc<RecencyBuffer>,
    pub queue: Arc<IngestQueue>,
    pub dedup_reset: DedupReset,
}

pub struct ReaderControl {
    client: Arc<dyn ReaderClient>,
    endpoint: ReaderEndpoint,
    config: ReaderConfig,
    pipeline: PipelineHandles,
    clear_policy: ClearPolicy,
    state: Mutex<SessionState>,
}

impl ReaderControl {
    pub fn new(
        client: Arc<dyn ReaderClient>,
        endpoint: ReaderEndpoint,
        config: ReaderConfig,
        pipeline: PipelineHandles,
        clear_policy: ClearPolicy,
    ) -> Self {
        Self {
            client,
            endpoint,
            config,
            pipeline,
            clear_policy,
            state: Mutex::new(SessionState::Disconnected),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state without reconciling against the client.
    pub fn session_state(&self) -> SessionState {
        *self.lock()
    }

    /// Demote a connected session whose client died underneath it.
    fn reconcile(&self, state: &mut SessionState) {
        if state.is_connected() && !self.client.is_alive() {
            warn!(reader = %self.endpoint, "Reader connection lost; session is now disconnected");
            *state = SessionState::Disconnected;
        }
    }

    fn connected_or_reject(
        &self,
        state: &mut SessionState,
        command: &'static str,
    ) -> Result<InventoryState, ControlError> {
        self.reconcile(state);
        match *state {
            SessionState::Connected(inventory) => Ok(inventory),
            SessionState::Disconnected => Err(ControlError::NotConnected { command }),
        }
    }

    pub fn connect(&self) -> ControlResult {
        let mut state = self.lock();
        self.reconcile(&mut state);
        if state.is_connected() {
            return Err(ControlError::InvalidTransition {
                command: "connect",
                state: *state,
            });
        }

        info!(reader = %self.endpoint, "Connecting to reader");
        self.client
            .connect(&self.endpoint, &self.config)
            .map_err(|source| ControlError::Connection {
                command: "connect",
                source,
            })?;

        let from = *state;
        *state = SessionState::Connected(InventoryState::Idle);
        info!(reader = %self.endpoint, "Connected to reader");

        if self.config.start_inventory_on_connect {
            drop(state);
            return self.start();
        }
        Ok(Outcome::Transitioned { from, to: *state })
    }

    /// Start inventory. Also clears the recency history and the dedup set.
    ///
    /// A start while already running is a no-op, so a GPI trigger and an operator
    /// `start` can race safely.
    pub fn start(&self) -> ControlResult {
        let mut state = self.lock();
        let inventory = self.connected_or_reject(&mut state, "start")?;
        if inventory == InventoryState::Running {
            return Ok(Outcome::Unchanged(*state));
        }

        // reset before the reader starts so the first report of the run is fresh
        self.pipeline.buffer.clear();
        self.pipeline.dedup_reset.request();

        self.client
            .start_inventory()
            .map_err(|source| self.reader_failure(&mut state, "start", source))?;

        let from = *state;
        *state = SessionState::Connected(InventoryState::Running);
        info!("Inventory started");
        Ok(Outcome::Transitioned { from, to: *state })
    }

    /// Stop inventory. Queued events are left for the consumer.
    pub fn stop(&self) -> ControlResult {
        let mut state = self.lock();
        let inventory = self.connected_or_reject(&mut state, "stop")?;
        if inventory == InventoryState::Idle {
            return Ok(Outcome::Unchanged(*state));
        }

        self.client
            .stop_inventory()
            .map_err(|source| self.reader_failure(&mut state, "stop", source))?;

        let from = *state;
        *state = SessionState::Connected(InventoryState::Idle);
        info!("Inventory stopped");
        Ok(Outcome::Transitioned { from, to: *state })
    }

    /// Clear accumulated tag data. Valid in any state; never touches the reader.
    ///
    /// Once this returns, the history stays empty until a new event is taken off
    /// the queue. An event the consumer had already taken still reaches the sinks
    /// (checked against the reset dedup set) but is kept out of history. With
    /// `discard_queued` off, events still queued count as arriving after the clear.
    pub fn clear(&self) -> ControlResult {
        let queued_discarded = if self.clear_policy.discard_queued {
            self.clear_queue()
        } else {
            0
        };
        if self.clear_policy.reset_dedup {
            self.pipeline.dedup_reset.request();
        }
        let history_cleared = self.pipeline.buffer.len();
        self.pipeline.buffer.clear();

        let summary = ClearSummary {
            history_cleared,
            queued_discarded,
            dedup_reset: self.clear_policy.reset_dedup,
        };
        info!(
            history = summary.history_cleared,
            queued = summary.queued_discarded,
            dedup_reset = summary.dedup_reset,
            "Tag data cleared"
        );
        Ok(Outcome::Cleared(summary))
    }

    /// Discard events not yet picked up by the consumer. Returns how many.
    pub fn clear_queue(&self) -> usize {
        let dropped = self.pipeline.queue.clear();
        if dropped > 0 {
            warn!("Discarded {} queued event(s)", dropped);
        }
        dropped
    }

    /// Pure read; valid in any state.
    pub fn query_state(&self) -> ControlResult {
        let mut state = self.lock();
        self.reconcile(&mut state);
        let reader_state = if state.is_connected() {
            Some(self.client.current_state().name)
        } else {
            None
        };
        Ok(Outcome::State(StateReport {
            session: *state,
            reader_state,
        }))
    }

    pub fn disconnect(&self) -> ControlResult {
        let mut state = self.lock();
        self.connected_or_reject(&mut state, "disconnect")?;

        let from = *state;
        // The session ends even if the client reports an error while closing.
        *state = SessionState::Disconnected;
        self.client
            .disconnect()
            .map_err(|source| ControlError::Connection {
                command: "disconnect",
                source,
            })?;
        info!(reader = %self.endpoint, "Disconnected from reader");
        Ok(Outcome::Transitioned {
            from,
            to: SessionState::Disconnected,
        })
    }

    /// Best-effort stop then disconnect. Always leaves the session disconnected.
    pub fn shutdown(&self) -> ControlResult {
        if !self.session_state().is_connected() {
            return Ok(Outcome::Unchanged(SessionState::Disconnected));
        }
        let mut first_error = None;
        match self.stop() {
            Ok(_) => {}
            Err(ControlError::NotConnected { .. }) => {
                return Ok(Outcome::Unchanged(SessionState::Disconnected))
            }
            Err(err) => {
                warn!("Stop during shutdown failed: {}", err);
                first_error = Some(err);
            }
        }
        let disconnected = match self.disconnect() {
            Ok(outcome) => outcome,
            Err(ControlError::NotConnected { .. }) => {
                Outcome::Unchanged(SessionState::Disconnected)
            }
            Err(err) => {
                warn!("Disconnect during shutdown failed: {}", err);
                first_error.get_or_insert(err);
                Outcome::Unchanged(SessionState::Disconnected)
            }
        };
        match first_error {
            Some(err) => Err(err),
            None => Ok(disconnected),
        }
    }

    /// Map a client failure; a dead client also ends the session.
    fn reader_failure(
        &self,
        state: &mut SessionState,
        command: &'static str,
        source: ReaderError,
    ) -> ControlError {
        self.reconcile(state);
        ControlError::Connection { command, source }
    }
}
