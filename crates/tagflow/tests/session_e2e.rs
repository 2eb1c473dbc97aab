//! Whole-session behaviour: startup, operator commands, shutdown drain.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tagflow::command::{CommandLoop, LoopExit};
use tagflow::config::{AppConfig, Cli, ConfigFile};
use tagflow::error::StartupError;
use tagflow::session::{open_sinks, Session};
use tagflow_control::{
    InventoryState, ReaderClient, ReaderError, ReaderEventCallback, ReaderState, SessionState,
    SimulatedReader, TagReportCallback,
};
use tagflow_ingest::CancellationToken;
use tagflow_protocol::{RawTagEntry, ReaderConfig, ReaderEndpoint};
use tempfile::{tempdir, TempDir};

/// Writer barrier: writes block until the gate is opened.
#[derive(Clone, Default)]
struct Gate(Arc<(Mutex<GateState>, Condvar)>);

#[derive(Default)]
struct GateState {
    open: bool,
    writer_waiting: bool,
}

impl Gate {
    fn open(&self) {
        let (state, cvar) = &*self.0;
        state.lock().unwrap().open = true;
        cvar.notify_all();
    }

    fn pass(&self) {
        let (state, cvar) = &*self.0;
        let mut guard = state.lock().unwrap();
        guard.writer_waiting = true;
        cvar.notify_all();
        while !guard.open {
            guard = cvar.wait(guard).unwrap();
        }
    }

    fn wait_for_writer(&self) {
        let (state, cvar) = &*self.0;
        let guard = state.lock().unwrap();
        let (guard, timeout) = cvar
            .wait_timeout_while(guard, Duration::from_secs(5), |s| !s.writer_waiting)
            .unwrap();
        assert!(!timeout.timed_out() && guard.writer_waiting);
    }
}

struct GatedWriter {
    gate: Gate,
    inner: SharedBuf,
}

impl Write for GatedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.gate.pass();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Default)]
struct ScriptedReader {
    calls: Mutex<Vec<&'static str>>,
    alive: AtomicBool,
    refuse: bool,
    disconnect_opens: Mutex<Option<Gate>>,
    tag_callbacks: Mutex<Vec<TagReportCallback>>,
    event_callbacks: Mutex<Vec<ReaderEventCallback>>,
}

impl ScriptedReader {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn fire_report(&self, entries: &[RawTagEntry]) {
        for callback in self.tag_callbacks.lock().unwrap().iter() {
            callback(entries);
        }
    }
}

impl ReaderClient for ScriptedReader {
    fn connect(&self, endpoint: &ReaderEndpoint, _config: &ReaderConfig) -> Result<(), ReaderError> {
        self.calls.lock().unwrap().push("connect");
        if self.refuse {
            return Err(ReaderError::Connect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".into(),
            });
        }
        self.alive.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ReaderError> {
        self.calls.lock().unwrap().push("disconnect");
        self.alive.store(false, Ordering::SeqCst);
        if let Some(gate) = self.disconnect_opens.lock().unwrap().take() {
            gate.open();
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn start_inventory(&self) -> Result<(), ReaderError> {
        self.calls.lock().unwrap().push("start_inventory");
        Ok(())
    }

    fn stop_inventory(&self) -> Result<(), ReaderError> {
        self.calls.lock().unwrap().push("stop_inventory");
        Ok(())
    }

    fn current_state(&self) -> ReaderState {
        ReaderState::new("Scripted")
    }

    fn register_tag_report_callback(&self, callback: TagReportCallback) {
        self.tag_callbacks.lock().unwrap().push(callback);
    }

    fn register_event_callback(&self, callback: ReaderEventCallback) {
        self.event_callbacks.lock().unwrap().push(callback);
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn config_in(dir: &Path, toml: &str) -> AppConfig {
    let mut file = ConfigFile::parse(toml, Path::new("test.toml")).unwrap();
    file.output.log_file = dir.join("tag_reads.txt");
    file.output.database = dir.join("tags.db");
    file.pipeline.poll_interval_ms = 10;
    let cli = Cli {
        reader: Some("10.0.0.5".to_string()),
        ..Cli::default()
    };
    AppConfig::merge(&cli, file).unwrap()
}

fn db_rows(path: PathBuf) -> Vec<(String, i64)> {
    let conn = rusqlite::Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT epc, seen_count FROM tag_reads ORDER BY id")
        .unwrap();
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

struct Running {
    dir: TempDir,
    reader: Arc<ScriptedReader>,
    session: Session,
}

fn start_session(toml: &str) -> Running {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path(), toml);
    let sinks = open_sinks(&config.output, io::sink()).unwrap();
    let reader = Arc::new(ScriptedReader::default());
    let session = Session::start(&config, reader.clone(), sinks).unwrap();
    Running {
        dir,
        reader,
        session,
    }
}

fn run_script(session: &Session, lines: &[&str], shutdown: CancellationToken) -> (LoopExit, String) {
    let (tx, rx) = mpsc::channel();
    for line in lines {
        tx.send(line.to_string()).unwrap();
    }
    drop(tx);
    let mut out = Vec::new();
    let exit = CommandLoop::new(session, shutdown).run(rx, &mut out).unwrap();
    (exit, String::from_utf8(out).unwrap())
}

#[test]
fn test_exit_drains_queued_events_to_every_sink() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path(), "");
    let gate = Gate::default();
    let console = SharedBuf::default();
    let sinks = open_sinks(
        &config.output,
        GatedWriter {
            gate: gate.clone(),
            inner: console.clone(),
        },
    )
    .unwrap();
    let reader = Arc::new(ScriptedReader {
        disconnect_opens: Mutex::new(Some(gate.clone())),
        ..ScriptedReader::default()
    });
    let session = Session::start(&config, reader.clone(), sinks).unwrap();

    // The consumer takes the first event and parks in the console write.
    reader.fire_report(&[RawTagEntry::new("W0")
        .with_seen_count(1)
        .with_last_seen(1_700_000_000_000_000)]);
    gate.wait_for_writer();

    let report: Vec<RawTagEntry> = (1..=5)
        .map(|i| {
            RawTagEntry::new(format!("TAG{}", i))
                .with_seen_count(i)
                .with_antenna(1)
                .with_last_seen(1_700_000_000_000_000)
        })
        .collect();
    reader.fire_report(&report);
    assert_eq!(session.queued(), 5);

    let (exit, _) = run_script(&session, &["exit"], CancellationToken::new());
    assert_eq!(exit, LoopExit::Command);
    assert_eq!(reader.calls(), vec!["connect", "disconnect"]);

    let summary = session.shutdown();
    let consumer = summary.consumer.unwrap();
    assert_eq!(consumer.fanned_out, 6);
    assert_eq!(consumer.abandoned, 0);

    let rows = db_rows(dir.path().join("tags.db"));
    let expected: Vec<(String, i64)> = std::iter::once(("W0".to_string(), 1))
        .chain((1..=5).map(|i| (format!("TAG{}", i), i as i64)))
        .collect();
    assert_eq!(rows, expected);
    let log = std::fs::read_to_string(dir.path().join("tag_reads.txt")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[1], "2023-11-14T22:13:20.000000Z,TAG1,1,,1");
    assert_eq!(console.text().lines().count(), 6);
}

#[test]
fn test_operator_transcript() {
    let Running {
        reader, session, ..
    } = start_session("");

    let (exit, out) = run_script(
        &session,
        &["state", "start", "start", "bogus", "", "stop", "clear", "history", "stats", "exit"],
        CancellationToken::new(),
    );

    assert_eq!(exit, LoopExit::Command);
    assert!(out.starts_with("Commands: [start] [stop] [clear] [state]"));
    assert!(out.contains("Session connected (idle) | Reader state: Scripted"));
    assert!(out.contains("Reader connected (running)"));
    assert!(out.contains("Reader already connected (running)"));
    assert!(out.contains("Unknown command 'bogus'. Type 'help' for the command list."));
    assert!(out.contains("Reader connected (idle)"));
    assert!(out.contains("Tag data cleared (0 in history"));
    assert!(out.contains("Recent tags (0/100):"));
    assert!(out.contains("Total tags seen: 0"));
    assert!(out.trim_end().ends_with("Reader disconnected"));

    assert_eq!(
        reader.calls(),
        vec!["connect", "start_inventory", "stop_inventory", "disconnect"]
    );
    session.shutdown();
}

#[test]
fn test_commands_after_exit_sequence_are_rejected() {
    let Running { session, .. } = start_session("");
    run_script(&session, &["exit"], CancellationToken::new());

    assert_eq!(session.state(), SessionState::Disconnected);
    let (_, out) = run_script(&session, &["start", "exit"], CancellationToken::new());
    assert!(out.contains("Rejected: Cannot start: not connected to a reader"));
    session.shutdown();
}

#[test]
fn test_end_of_input_runs_exit_sequence() {
    let Running {
        reader, session, ..
    } = start_session("");
    let (exit, _) = run_script(&session, &["start"], CancellationToken::new());
    assert_eq!(exit, LoopExit::EndOfInput);
    assert_eq!(
        reader.calls(),
        vec!["connect", "start_inventory", "stop_inventory", "disconnect"]
    );
    session.shutdown();
}

#[test]
fn test_cancellation_stops_the_loop() {
    let Running { session, .. } = start_session("");
    let (_tx, rx) = mpsc::channel::<String>();
    let shutdown = CancellationToken::new();
    shutdown.cancel_with("SIGTERM");

    let mut out = Vec::new();
    let exit = CommandLoop::new(&session, shutdown.clone())
        .run(rx, &mut out)
        .unwrap();
    assert_eq!(exit, LoopExit::Cancelled);
    assert_eq!(shutdown.reason(), Some("SIGTERM"));
    assert_eq!(session.state(), SessionState::Disconnected);
    session.shutdown();
}

#[test]
fn test_history_and_dedup_through_the_session() {
    let Running {
        dir,
        reader,
        session,
        ..
    } = start_session("[pipeline]\nhistory_capacity = 3\n");

    for epc in ["A", "B", "A", "C", "D"] {
        reader.fire_report(&[RawTagEntry::new(epc).with_seen_count(1)]);
    }
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.history().last().map(|e| e.epc() != "D").unwrap_or(true)
        && Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(5));
    }

    let history: Vec<String> = session
        .history()
        .iter()
        .map(|e| e.epc().to_string())
        .collect();
    assert_eq!(history, vec!["A", "C", "D"]);

    let (_, out) = run_script(&session, &["history", "clear", "history"], CancellationToken::new());
    assert!(out.contains("Recent tags (3/3):"));
    assert!(out.contains("Tag data cleared (3 in history, dedup reset)"));
    assert!(out.contains("Recent tags (0/3):"));
    session.shutdown();

    let epcs: Vec<String> = db_rows(dir.path().join("tags.db"))
        .into_iter()
        .map(|(epc, _)| epc)
        .collect();
    assert_eq!(epcs, vec!["A", "B", "C", "D"]);
}

#[test]
fn test_unwritable_output_fails_before_connecting() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path(), "");
    // a directory where the database file should be
    config.output.database = Some(dir.path().to_path_buf());

    let err = open_sinks(&config.output, io::sink()).err().unwrap();
    assert!(matches!(err, StartupError::Sink { sink: "database", .. }));
}

#[test]
fn test_refused_connection_is_a_startup_error() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path(), "");
    let sinks = open_sinks(&config.output, io::sink()).unwrap();
    let reader = Arc::new(ScriptedReader {
        refuse: true,
        ..ScriptedReader::default()
    });

    let err = Session::start(&config, reader.clone(), sinks).err().unwrap();
    assert!(matches!(err, StartupError::Connect(_)));
    assert!(err.to_helpful().to_string().contains("TRY:"));
    assert_eq!(reader.calls(), vec!["connect"]);
}

#[test]
fn test_gpi_trigger_starts_inventory() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path(), "[reader]\ngpi_start_port = 1\n");
    let sinks = open_sinks(&config.output, io::sink()).unwrap();
    let reader = Arc::new(SimulatedReader::new(vec!["G1".into()]).with_interval(Duration::from_millis(5)));
    let session = Session::start(&config, reader.clone(), sinks).unwrap();

    reader.trigger_gpi(2, true);
    reader.trigger_gpi(1, false);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(session.state(), SessionState::Connected(InventoryState::Idle));

    reader.trigger_gpi(1, true);
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.metrics().events_processed == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(
        session.state(),
        SessionState::Connected(InventoryState::Running)
    );

    let summary = session.shutdown();
    assert!(summary.metrics.events_processed >= 1);
    assert_eq!(summary.consumer.unwrap().fanned_out, 1);
}
