//! tagflow: RFID tag ingestion.
//!
//! Three execution contexts share one [`session::Session`]:
//! - the reader client's thread, which runs the tag-report callback (decode + enqueue)
//! - the consumer thread, which dedups and fans events out to the sinks
//! - the foreground [`command::CommandLoop`], which drives the control facade
//!
//! Shutdown (`exit`, end of input, SIGINT/SIGTERM) stops and disconnects the reader,
//! then drains and joins the consumer.

pub mod command;
pub mod config;
pub mod error;
pub mod session;
pub mod signals;

use anyhow::{Context, Result};
use std::sync::Arc;
use tagflow_control::{ReaderClient, SimulatedReader};
use tagflow_ingest::CancellationToken;
use tracing::info;

use crate::command::{spawn_stdin_reader, CommandLoop};
use crate::config::{AppConfig, Cli};
use crate::session::{open_sinks, Session};

/// Run one interactive session against the simulated reader.
pub fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::resolve(&cli)?;
    info!(
        reader = %config.endpoint,
        tags = config.simulator.tags.len(),
        "Using simulated reader"
    );
    let client: Arc<dyn ReaderClient> = Arc::new(
        SimulatedReader::new(config.simulator.tags.clone())
            .with_interval(config.simulator.report_interval),
    );
    run_with(&config, client)
}

/// Run one interactive session on stdin/stdout against `client`.
///
/// Sinks are opened and the reader connected before any thread is spawned, so a
/// startup failure leaves nothing behind. Signal handlers go in only once the
/// session is up.
pub fn run_with(config: &AppConfig, client: Arc<dyn ReaderClient>) -> Result<()> {
    let sinks = open_sinks(&config.output, std::io::stdout())?;
    let session = Session::start(config, client, sinks)?;

    let shutdown = CancellationToken::new();
    let input = match signals::install(shutdown.clone())
        .map_err(anyhow::Error::from)
        .and_then(|()| spawn_stdin_reader().context("Failed to read operator input"))
    {
        Ok(input) => input,
        Err(err) => {
            session.shutdown();
            return Err(err);
        }
    };

    let exit = CommandLoop::new(&session, shutdown).run(input, &mut std::io::stdout());
    let report = session.shutdown();
    if let Some(consumer) = &report.consumer {
        info!(
            recorded = consumer.fanned_out,
            drained = consumer.drained,
            "Session closed"
        );
    }

    let exit = exit.context("Command loop failed")?;
    info!("Exited on {}", exit.as_str());
    Ok(())
}
