//! Command-line flags, the optional TOML file, and the resolved [`AppConfig`].
//!
//! Precedence: CLI flag > config file > built-in default.
//!
//! ```toml
//! [reader]
//! address = "192.168.1.100"
//! antennas = [1, 2]
//! report_every_n_tags = 1
//! gpi_start_port = 1
//!
//! [[reader.tx_power]]
//! antenna = 1
//! power = 150
//!
//! [output]
//! log_file = "tag_reads.txt"   # "" disables the append log
//! database = "tags.db"         # "" disables the database
//! table = "tag_reads"
//!
//! [pipeline]
//! dedup = "session"            # or "none"
//! clear_resets_dedup = true
//! ```

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tagflow_ingest::DedupPolicy;
use tagflow_protocol::defaults::{
    DEFAULT_DATABASE_FILE, DEFAULT_DRAIN_DEADLINE_MS, DEFAULT_HISTORY_CAPACITY, DEFAULT_LOG_FILE,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_READER_PORT, DEFAULT_TABLE,
};
use tagflow_protocol::{ConfigError, ReaderConfig, ReaderEndpoint};

use crate::error::StartupError;

const DEFAULT_SIMULATED_TAGS: [&str; 3] = [
    "300833B2DDD9014000000001",
    "300833B2DDD9014000000002",
    "300833B2DDD9014000000003",
];
const DEFAULT_SIMULATOR_INTERVAL_MS: u64 = 500;

/// Ingest RFID tag reports into the console, an append log and SQLite.
#[derive(Debug, Default, Parser)]
#[command(name = "tagflow", version, about)]
pub struct Cli {
    /// Reader address: host, host:port or [ipv6]:port
    #[arg(long, env = "TAGFLOW_READER", value_name = "ADDR")]
    pub reader: Option<String>,

    /// Reader port when the address carries none [default: 5084]
    #[arg(long)]
    pub port: Option<u16>,

    /// Append-log output path [default: tag_reads.txt]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// SQLite database path [default: tags.db]
    #[arg(long = "db", value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Database table [default: tag_reads]
    #[arg(long)]
    pub table: Option<String>,

    /// Do not print tag lines on stdout
    #[arg(long)]
    pub no_console: bool,

    /// Do not write the append log
    #[arg(long)]
    pub no_log_file: bool,

    /// Do not write the database
    #[arg(long)]
    pub no_db: bool,

    /// Dedup policy: session (each EPC once per session) or none
    #[arg(long, value_name = "POLICY")]
    pub dedup: Option<DedupPolicy>,

    /// Recent-tag history size [default: 100]
    #[arg(long, value_name = "N")]
    pub history: Option<usize>,

    /// TOML config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug-level diagnostics on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Tag population for the simulated reader
    #[arg(long, value_name = "EPC,...", value_delimiter = ',')]
    pub simulate_tags: Vec<String>,

    /// Only record this EPC
    #[arg(long, value_name = "EPC")]
    pub epc: Option<String>,

    /// Stamp events with the host clock, ignoring reader timestamps
    #[arg(long)]
    pub host_clock: bool,
}

/// `[reader]`: endpoint plus the inventory configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSection {
    pub address: Option<String>,
    pub port: Option<u16>,
    /// GPI input that starts inventory when it goes high
    pub gpi_start_port: Option<u16>,
    #[serde(flatten)]
    pub inventory: ReaderConfig,
}

/// `[output]`: an empty path disables that sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub console: bool,
    pub log_file: PathBuf,
    pub database: PathBuf,
    pub table: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            console: true,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            database: PathBuf::from(DEFAULT_DATABASE_FILE),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

/// `[pipeline]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub dedup: DedupPolicy,
    pub history_capacity: usize,
    /// Unbounded when absent
    pub queue_capacity: Option<usize>,
    pub poll_interval_ms: u64,
    pub drain_deadline_ms: u64,
    pub clear_resets_dedup: bool,
    pub clear_discards_queued: bool,
    pub epc_filter: Option<String>,
    pub prefer_reader_clock: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            dedup: DedupPolicy::Session,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            queue_capacity: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            drain_deadline_ms: DEFAULT_DRAIN_DEADLINE_MS,
            clear_resets_dedup: true,
            clear_discards_queued: true,
            epc_filter: None,
            prefer_reader_clock: true,
        }
    }
}

/// `[simulator]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSection {
    pub tags: Vec<String>,
    pub report_interval_ms: u64,
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self {
            tags: DEFAULT_SIMULATED_TAGS.iter().map(|s| s.to_string()).collect(),
            report_interval_ms: DEFAULT_SIMULATOR_INTERVAL_MS,
        }
    }
}

/// On-disk configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub reader: ReaderSection,
    pub output: OutputSection,
    pub pipeline: PipelineSection,
    pub simulator: SimulatorSection,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let content = std::fs::read_to_string(path).map_err(|source| StartupError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, StartupError> {
        toml::from_str(content).map_err(|source| StartupError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved output targets; `None` means the sink is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub console: bool,
    pub log_file: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub tags: Vec<String>,
    pub report_interval: Duration,
}

/// Fully resolved, validated configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoint: ReaderEndpoint,
    pub reader: ReaderConfig,
    pub gpi_start_port: Option<u16>,
    pub output: OutputConfig,
    pub pipeline: PipelineSection,
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    /// Load the config file named by `--config` (if any) and apply CLI overrides.
    pub fn resolve(cli: &Cli) -> Result<Self, StartupError> {
        let file = match &cli.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: &Cli, file: ConfigFile) -> Result<Self, StartupError> {
        let address = cli
            .reader
            .clone()
            .or(file.reader.address)
            .filter(|a| !a.trim().is_empty())
            .ok_or(StartupError::MissingAddress)?;
        let default_port = cli.port.or(file.reader.port).unwrap_or(DEFAULT_READER_PORT);
        let endpoint = ReaderEndpoint::parse(&address, default_port).map_err(|source| match source {
            ConfigError::MissingAddress => StartupError::MissingAddress,
            source => StartupError::InvalidAddress {
                address: address.clone(),
                source,
            },
        })?;

        let reader = file.reader.inventory;
        reader.validate().map_err(StartupError::ReaderConfig)?;

        let enabled = |path: PathBuf| Some(path).filter(|p| !p.as_os_str().is_empty());
        let output = OutputConfig {
            console: file.output.console && !cli.no_console,
            log_file: if cli.no_log_file {
                None
            } else {
                enabled(cli.log_file.clone().unwrap_or(file.output.log_file))
            },
            database: if cli.no_db {
                None
            } else {
                enabled(cli.database.clone().unwrap_or(file.output.database))
            },
            table: cli.table.clone().unwrap_or(file.output.table),
        };

        let mut pipeline = file.pipeline;
        if let Some(dedup) = cli.dedup {
            pipeline.dedup = dedup;
        }
        if let Some(history) = cli.history {
            pipeline.history_capacity = history;
        }
        if let Some(epc) = &cli.epc {
            pipeline.epc_filter = Some(epc.clone());
        }
        if cli.host_clock {
            pipeline.prefer_reader_clock = false;
        }
        if pipeline.history_capacity == 0 {
            return Err(StartupError::InvalidSetting {
                setting: "history_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if pipeline.queue_capacity == Some(0) {
            return Err(StartupError::InvalidSetting {
                setting: "queue_capacity",
                reason: "must be at least 1 (omit it for an unbounded queue)".to_string(),
            });
        }
        if pipeline.poll_interval_ms == 0 {
            return Err(StartupError::InvalidSetting {
                setting: "poll_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }

        let tags = if cli.simulate_tags.is_empty() {
            file.simulator.tags
        } else {
            cli.simulate_tags.clone()
        };
        let simulator = SimulatorConfig {
            tags: tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            report_interval: Duration::from_millis(file.simulator.report_interval_ms.max(1)),
        };

        Ok(Self {
            endpoint,
            reader,
            gpi_start_port: file.reader.gpi_start_port,
            output,
            pipeline,
            simulator,
        })
    }
}
