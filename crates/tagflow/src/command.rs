//! Operator command loop.
//!
//! Reads one command per line, maps it onto the control facade, and writes a
//! short response. Lines arrive over a channel so the loop can notice a shutdown
//! request (signal) between reads.

use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tagflow_control::{ControlError, Outcome};
use tagflow_ingest::CancellationToken;
use tagflow_sinks::record;
use thiserror::Error;
use tracing::{info, warn};

use crate::session::Session;

const INPUT_POLL: Duration = Duration::from_millis(100);
const PROMPT: &str = "> ";
const MENU: &str = "Commands: [start] [stop] [clear] [state] [history] [stats] [help] [exit]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Clear,
    State,
    History,
    Stats,
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command '{0}'")]
pub struct UnknownCommand(pub String);

impl Command {
    pub fn parse(input: &str) -> Result<Command, UnknownCommand> {
        match input.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "clear" => Ok(Command::Clear),
            "state" | "status" => Ok(Command::State),
            "history" => Ok(Command::History),
            "stats" => Ok(Command::Stats),
            "help" | "?" => Ok(Command::Help),
            "exit" | "quit" => Ok(Command::Exit),
            _ => Err(UnknownCommand(input.trim().to_string())),
        }
    }
}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Operator typed `exit`
    Command,
    /// Input closed (EOF)
    EndOfInput,
    /// Shutdown requested from outside (signal)
    Cancelled,
}

impl LoopExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopExit::Command => "exit command",
            LoopExit::EndOfInput => "end of input",
            LoopExit::Cancelled => "shutdown signal",
        }
    }
}

pub struct CommandLoop<'a> {
    session: &'a Session,
    shutdown: CancellationToken,
}

impl<'a> CommandLoop<'a> {
    pub fn new(session: &'a Session, shutdown: CancellationToken) -> Self {
        Self { session, shutdown }
    }

    /// Run until `exit`, end of input or cancellation. On the way out the reader is
    /// stopped and disconnected; the caller then shuts the session down.
    pub fn run(&self, input: Receiver<String>, output: &mut impl Write) -> io::Result<LoopExit> {
        writeln!(output, "{}", MENU)?;
        prompt(output)?;

        let exit = loop {
            if self.shutdown.is_cancelled() {
                writeln!(output)?;
                break LoopExit::Cancelled;
            }
            let line = match input.recv_timeout(INPUT_POLL) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break LoopExit::EndOfInput,
            };
            if line.trim().is_empty() {
                prompt(output)?;
                continue;
            }
            match Command::parse(&line) {
                Ok(Command::Exit) => break LoopExit::Command,
                Ok(command) => self.execute(command, output)?,
                Err(unknown) => {
                    writeln!(output, "{}. Type 'help' for the command list.", unknown)?
                }
            }
            prompt(output)?;
        };

        self.shutdown.cancel_with(exit.as_str());
        info!(reason = exit.as_str(), "Leaving command loop");
        match self.session.control().shutdown() {
            Ok(outcome) => writeln!(output, "{}", outcome)?,
            Err(err) => writeln!(output, "Error: {}", err)?,
        }
        Ok(exit)
    }

    fn execute(&self, command: Command, output: &mut impl Write) -> io::Result<()> {
        let control = self.session.control();
        match command {
            Command::Start => respond(output, control.start()),
            Command::Stop => respond(output, control.stop()),
            Command::Clear => respond(output, control.clear()),
            Command::State => respond(output, control.query_state()),
            Command::History => {
                let history = self.session.history();
                writeln!(
                    output,
                    "Recent tags ({}/{}):",
                    history.len(),
                    self.session.history_capacity()
                )?;
                for event in &history {
                    writeln!(output, "  {}", record::console_line(event))?;
                }
                Ok(())
            }
            Command::Stats => {
                let stats = self.session.metrics();
                writeln!(output, "{}", stats.summary())?;
                writeln!(output, "Queued: {}", self.session.queued())
            }
            Command::Help => {
                writeln!(output, "{}", MENU)?;
                writeln!(output, "  start    start inventory (clears history and dedup)")?;
                writeln!(output, "  stop     stop inventory")?;
                writeln!(output, "  clear    clear tag history")?;
                writeln!(output, "  state    show session and reader state")?;
                writeln!(output, "  history  show recently seen tags")?;
                writeln!(output, "  stats    show pipeline counters")?;
                writeln!(output, "  exit     stop, disconnect and quit")
            }
            Command::Exit => Ok(()),
        }
    }
}

fn prompt(output: &mut impl Write) -> io::Result<()> {
    write!(output, "{}", PROMPT)?;
    output.flush()
}

fn respond(output: &mut impl Write, result: Result<Outcome, ControlError>) -> io::Result<()> {
    match result {
        Ok(outcome) => writeln!(output, "{}", outcome),
        Err(err) if err.is_rejection() => {
            info!("Command rejected: {}", err);
            writeln!(output, "Rejected: {}", err)
        }
        Err(err) => {
            warn!("Command failed: {}", err);
            writeln!(output, "Error: {}", err)
        }
    }
}

/// Forward stdin lines to a channel. The sender drops at EOF.
pub fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("tagflow-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("Failed to read stdin: {}", err);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}
