use std::sync::atomic::{AtomicBool, Ordering};
use tagflow_ingest::CancellationToken;
use tracing::info;

use crate::error::StartupError;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Whether [`install`] has routed signals into a shutdown token in this process.
pub fn installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

/// Route SIGINT/SIGTERM (Ctrl+C on Windows) into the shutdown token.
///
/// Only the first call installs handlers; later calls are no-ops.
pub fn install(shutdown: CancellationToken) -> Result<(), StartupError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    install_handlers(shutdown).map_err(|err| {
        INSTALLED.store(false, Ordering::SeqCst);
        err
    })
}

#[cfg(unix)]
fn install_handlers(shutdown: CancellationToken) -> Result<(), StartupError> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(StartupError::Signals)?;
    std::thread::Builder::new()
        .name("tagflow-signals".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                let reason = if sig == SIGINT { "SIGINT" } else { "SIGTERM" };
                info!("Received {}, initiating shutdown...", reason);
                shutdown.cancel_with(reason);
            }
        })
        .map_err(StartupError::Signals)?;
    Ok(())
}

#[cfg(windows)]
fn install_handlers(shutdown: CancellationToken) -> Result<(), StartupError> {
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown.cancel_with("Ctrl+C");
    })
    .map_err(|err| StartupError::Signals(std::io::Error::new(std::io::ErrorKind::Other, err)))
}
