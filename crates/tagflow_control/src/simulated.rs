//! In-process reader used when no protocol client is linked in.
//!
//! While inventory runs, a background thread emits one tag report per interval,
//! cycling through a fixed EPC population over the configured antennas.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tagflow_protocol::{RawTagEntry, ReaderConfig, ReaderEndpoint};
use tracing::{debug, info, warn};

use crate::client::{
    ReaderClient, ReaderError, ReaderEvent, ReaderEventCallback, ReaderState, TagReportCallback,
};

type SharedTagCallback = Arc<dyn Fn(&[RawTagEntry]) + Send + Sync>;
type SharedEventCallback = Arc<dyn Fn(&ReaderEvent) + Send + Sync>;

const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(500);

struct Emitter {
    stop_tx: mpsc::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl Emitter {
    fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.join_handle.join().is_err() {
            warn!("Simulated reader emitter thread panicked");
        }
    }
}

#[derive(Default)]
struct SimState {
    connected: bool,
    config: ReaderConfig,
    emitter: Option<Emitter>,
}

#[derive(Default)]
struct Callbacks {
    tag_reports: Vec<SharedTagCallback>,
    events: Vec<SharedEventCallback>,
}

/// Simulated reader with a fixed tag population.
pub struct SimulatedReader {
    population: Vec<String>,
    interval: Duration,
    state: Mutex<SimState>,
    callbacks: Arc<Mutex<Callbacks>>,
}

impl SimulatedReader {
    pub fn new(population: Vec<String>) -> Self {
        Self {
            population,
            interval: DEFAULT_REPORT_INTERVAL,
            state: Mutex::new(SimState::default()),
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit a GPI level change, as a reader input port would.
    pub fn trigger_gpi(&self, port: u16, high: bool) {
        emit_event(&self.callbacks, &ReaderEvent::Gpi { port, high });
    }

    /// Drop the connection without a `disconnect` call.
    pub fn sever(&self) {
        let emitter = {
            let mut state = self.lock_state();
            state.connected = false;
            state.emitter.take()
        };
        if let Some(emitter) = emitter {
            emitter.stop();
        }
        emit_event(&self.callbacks, &ReaderEvent::Disconnected);
    }
}

fn lock_callbacks(callbacks: &Mutex<Callbacks>) -> MutexGuard<'_, Callbacks> {
    callbacks.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit_event(callbacks: &Mutex<Callbacks>, event: &ReaderEvent) {
    // Snapshot so no lock is held while user code runs.
    let listeners = lock_callbacks(callbacks).events.clone();
    for listener in listeners {
        listener(event);
    }
}

fn build_report(
    population: &[String],
    antennas: &[u16],
    batch: usize,
    cursor: &mut usize,
) -> Vec<RawTagEntry> {
    let now = chrono::Utc::now().timestamp_micros().max(0) as u64;
    (0..batch)
        .map(|_| {
            let index = *cursor;
            *cursor = cursor.wrapping_add(1);
            let epc = &population[index % population.len()];
            let antenna = antennas[index % antennas.len()];
            let round = index / population.len();
            RawTagEntry::new(epc.as_bytes())
                .with_antenna(antenna)
                .with_channel((index % 50) as u16 + 1)
                .with_peak_rssi(-40 - (index % 30) as i8)
                .with_last_seen(now)
                .with_seen_count(round as u32 + 1)
        })
        .collect()
}

impl ReaderClient for SimulatedReader {
    fn connect(&self, endpoint: &ReaderEndpoint, config: &ReaderConfig) -> Result<(), ReaderError> {
        config.validate().map_err(|err| ReaderError::Connect {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        })?;
        {
            let mut state = self.lock_state();
            state.connected = true;
            state.config = config.clone();
        }
        info!(
            reader = %endpoint,
            antennas = ?config.antennas,
            tags = self.population.len(),
            "Simulated reader connected"
        );
        emit_event(
            &self.callbacks,
            &ReaderEvent::ConnectionAttempt {
                status: "Success".to_string(),
            },
        );
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ReaderError> {
        let emitter = {
            let mut state = self.lock_state();
            if !state.connected {
                return Err(ReaderError::NotConnected);
            }
            state.connected = false;
            state.emitter.take()
        };
        if let Some(emitter) = emitter {
            emitter.stop();
        }
        emit_event(&self.callbacks, &ReaderEvent::Disconnected);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.lock_state().connected
    }

    fn start_inventory(&self) -> Result<(), ReaderError> {
        let mut state = self.lock_state();
        if !state.connected {
            return Err(ReaderError::NotConnected);
        }
        if state.emitter.is_some() {
            return Ok(());
        }
        if self.population.is_empty() {
            debug!("Simulated reader has no tags in range");
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let population = self.population.clone();
        let antennas = state.config.antennas.clone();
        let batch = state.config.report_every_n_tags.max(1) as usize;
        let interval = self.interval;
        let callbacks = Arc::clone(&self.callbacks);

        let join_handle = std::thread::Builder::new()
            .name("tagflow-sim-reader".to_string())
            .spawn(move || {
                let mut cursor = 0usize;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    if population.is_empty() || antennas.is_empty() {
                        continue;
                    }
                    let report = build_report(&population, &antennas, batch, &mut cursor);
                    let listeners = lock_callbacks(&callbacks).tag_reports.clone();
                    for listener in listeners {
                        listener(&report);
                    }
                }
            })?;

        state.emitter = Some(Emitter {
            stop_tx,
            join_handle,
        });
        Ok(())
    }

    fn stop_inventory(&self) -> Result<(), ReaderError> {
        let emitter = {
            let mut state = self.lock_state();
            if !state.connected {
                return Err(ReaderError::NotConnected);
            }
            state.emitter.take()
        };
        if let Some(emitter) = emitter {
            emitter.stop();
        }
        Ok(())
    }

    fn current_state(&self) -> ReaderState {
        let state = self.lock_state();
        match (state.connected, state.emitter.is_some()) {
            (false, _) => ReaderState::new("Disconnected"),
            (true, false) => ReaderState::new("Connected"),
            (true, true) => ReaderState::new("Inventorying"),
        }
    }

    fn register_tag_report_callback(&self, callback: TagReportCallback) {
        lock_callbacks(&self.callbacks)
            .tag_reports
            .push(Arc::from(callback));
    }

    fn register_event_callback(&self, callback: ReaderEventCallback) {
        lock_callbacks(&self.callbacks).events.push(Arc::from(callback));
    }
}

impl Drop for SimulatedReader {
    fn drop(&mut self) {
        let emitter = self.lock_state().emitter.take();
        if let Some(emitter) = emitter {
            emitter.stop();
        }
    }
}
