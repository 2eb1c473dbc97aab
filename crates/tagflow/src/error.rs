//! Startup errors and their operator-facing rendering.
//!
//! Every fatal startup error renders as a [`HelpfulError`]:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::PathBuf;
use tagflow_control::ControlError;
use tagflow_ingest::ConsumerError;
use tagflow_protocol::ConfigError;
use tagflow_sinks::SinkError;
use thiserror::Error;

/// Errors that abort the process before the session runs.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("No reader address given")]
    MissingAddress,

    #[error("Invalid reader address '{address}'")]
    InvalidAddress {
        address: String,
        #[source]
        source: ConfigError,
    },

    #[error("Invalid reader configuration: {0}")]
    ReaderConfig(#[source] ConfigError),

    #[error("Invalid setting {setting}: {reason}")]
    InvalidSetting {
        setting: &'static str,
        reason: String,
    },

    #[error("Cannot read config file {}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file {}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot open {sink} output {}", .path.display())]
    Sink {
        sink: &'static str,
        path: PathBuf,
        #[source]
        source: SinkError,
    },

    #[error("Cannot connect to reader")]
    Connect(#[source] ControlError),

    #[error("Cannot start consumer")]
    Consumer(#[source] ConsumerError),

    #[error("Cannot install signal handlers")]
    Signals(#[source] std::io::Error),
}

impl StartupError {
    /// Operator-facing rendering with suggestions.
    pub fn to_helpful(&self) -> HelpfulError {
        let base = HelpfulError::new(self.to_string());
        let base = match std::error::Error::source(self) {
            Some(source) => base.with_context(source.to_string()),
            None => base,
        };
        match self {
            StartupError::MissingAddress => base
                .with_context("The reader address is required to start a session")
                .with_suggestions([
                    "TRY: Pass it on the command line: tagflow --reader 192.168.1.100",
                    "TRY: Set TAGFLOW_READER=192.168.1.100",
                    "TRY: Add address = \"...\" under [reader] in the config file",
                ]),
            StartupError::InvalidAddress { .. } => base.with_suggestions([
                "TRY: Use host, host:port, or [ipv6]:port",
                "TRY: Pass the port separately with --port",
            ]),
            StartupError::ReaderConfig(_) => base.with_suggestions([
                "TRY: Check antennas, tx_power and report_every_n_tags under [reader]",
                "TRY: Every [[reader.tx_power]] entry must name an enabled antenna",
            ]),
            StartupError::InvalidSetting { .. } => {
                base.with_suggestion("TRY: Run tagflow --help for accepted values")
            }
            StartupError::ConfigRead { path, .. } => base.with_suggestions([
                format!("TRY: Check that the file exists: ls -la {}", path.display()),
                "TRY: Omit --config to run with built-in defaults".to_string(),
            ]),
            StartupError::ConfigParse { .. } => base.with_suggestions([
                "TRY: Sections are [reader], [output], [pipeline] and [simulator]",
                "TRY: Validate the TOML syntax of the file",
            ]),
            StartupError::Sink { sink, path, .. } => base.with_suggestions([
                format!(
                    "TRY: Check write permissions for {}",
                    path.parent()
                        .filter(|p| !p.as_os_str().is_empty())
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| ".".to_string())
                ),
                format!("TRY: Choose another path, or disable the {} output", sink),
            ]),
            StartupError::Connect(_) => base.with_suggestions([
                "TRY: Check that the reader is powered on and reachable: ping <reader>",
                "TRY: Confirm the LLRP port (default 5084) is not blocked",
            ]),
            StartupError::Consumer(_) | StartupError::Signals(_) => {
                base.with_suggestion("TRY: Check system resource limits (threads, file handles)")
            }
        }
    }
}

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error. Replaces any earlier context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
