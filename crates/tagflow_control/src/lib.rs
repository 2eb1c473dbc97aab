//! Reader control plane.
//!
//! - [`client`]: the [`ReaderClient`] boundary a protocol implementation plugs into
//! - [`facade`]: [`ReaderControl`], the session state machine every command goes through
//! - [`simulated`]: [`SimulatedReader`], an in-process client for demos and tests

pub mod client;
pub mod facade;
pub mod simulated;

pub use client::{
    ReaderClient, ReaderError, ReaderEvent, ReaderEventCallback, ReaderState, TagReportCallback,
};
pub use facade::{
    ClearPolicy, ClearSummary, ControlError, ControlResult, InventoryState, Outcome,
    PipelineHandles, ReaderControl, SessionState, StateReport,
};
pub use simulated::SimulatedReader;
