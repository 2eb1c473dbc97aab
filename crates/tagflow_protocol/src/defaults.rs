//! Canonical default values shared across the pipeline and the launcher.

/// Default LLRP port.
pub const DEFAULT_READER_PORT: u16 = 5084;
pub const DEFAULT_LOG_FILE: &str = "tag_reads.txt";
pub const DEFAULT_DATABASE_FILE: &str = "tags.db";
pub const DEFAULT_TABLE: &str = "tag_reads";
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
pub const DEFAULT_DRAIN_DEADLINE_MS: u64 = 5_000;
pub const DEFAULT_ANTENNAS: [u16; 2] = [1, 2];
/// Transmit power table index applied to every default antenna.
pub const DEFAULT_TX_POWER: u16 = 200;
pub const DEFAULT_REPORT_EVERY_N_TAGS: u32 = 1;
