//! Tag-report model shared by the ingest pipeline, the sinks and the reader control plane.
//!
//! A reader-protocol client hands the pipeline batches of [`RawTagEntry`] values (one per
//! tag observation in a report). Each entry is decoded into an immutable [`TagEvent`];
//! a malformed entry fails on its own and never takes its siblings down with it.
//!
//! ```text
//! reader client --(tag report: [RawTagEntry])--> decode_report --> [TagEvent] --> queue
//! ```

pub mod config;
pub mod defaults;
pub mod tag;

pub use config::{AntennaPower, ConfigError, ReaderConfig, ReaderEndpoint, TagContentSelector};
pub use tag::{
    decode_report, DecodeError, DecodeOptions, DecodedReport, RawTagEntry, TagEvent,
    TimestampSource,
};
