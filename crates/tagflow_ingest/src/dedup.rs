use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tagflow_protocol::TagEvent;

/// Which reports reach the sinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// An EPC reaches the sinks at most once per session.
    #[default]
    Session,
    /// Every report reaches the sinks (repeat-count trend logging).
    None,
}

impl DedupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupPolicy::Session => "session",
            DedupPolicy::None => "none",
        }
    }
}

impl fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(DedupPolicy::Session),
            "none" | "off" => Ok(DedupPolicy::None),
            other => Err(format!(
                "unknown dedup policy '{}' (expected 'session' or 'none')",
                other
            )),
        }
    }
}

/// Result of checking an event against the seen set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    Fresh,
    Duplicate,
}

/// Shared reset request for the consumer-private seen set.
///
/// The control plane bumps a generation counter; the filter notices on its next
/// check and starts over. Neither side ever waits for the other.
#[derive(Debug, Clone, Default)]
pub struct DedupReset {
    generation: Arc<AtomicU64>,
}

impl DedupReset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the filter to forget every EPC seen so far.
    pub fn request(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Consumer-side dedup state. Never shared.
#[derive(Debug)]
pub struct DedupFilter {
    policy: DedupPolicy,
    seen: HashSet<String>,
    reset: DedupReset,
    applied_generation: u64,
}

impl DedupFilter {
    pub fn new(policy: DedupPolicy, reset: DedupReset) -> Self {
        let applied_generation = reset.generation();
        Self {
            policy,
            seen: HashSet::new(),
            reset,
            applied_generation,
        }
    }

    /// Record the event and decide whether it is new for this session.
    pub fn check(&mut self, event: &TagEvent) -> DedupDecision {
        self.sync_reset();
        match self.policy {
            DedupPolicy::None => DedupDecision::Fresh,
            DedupPolicy::Session => {
                if self.seen.contains(event.epc()) {
                    DedupDecision::Duplicate
                } else {
                    self.seen.insert(event.epc().to_string());
                    DedupDecision::Fresh
                }
            }
        }
    }

    /// Distinct EPCs remembered in the current session.
    pub fn seen_len(&mut self) -> usize {
        self.sync_reset();
        self.seen.len()
    }

    fn sync_reset(&mut self) {
        let current = self.reset.generation();
        if current != self.applied_generation {
            self.seen.clear();
            self.applied_generation = current;
        }
    }
}
