use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Default)]
struct Shared {
    cancelled: AtomicBool,
    reason: OnceLock<&'static str>,
}

/// Shutdown request shared between the command loop, signal handlers and the consumer.
///
/// Clone is cheap and shares state. The first caller's reason wins.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel_with("requested");
    }

    /// Request cancellation, recording why (e.g. "exit command", "SIGTERM").
    pub fn cancel_with(&self, reason: &'static str) {
        let _ = self.shared.reason.set(reason);
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }

    /// Reason given by the first cancel call, if any.
    pub fn reason(&self) -> Option<&'static str> {
        self.shared.reason.get().copied()
    }
}
