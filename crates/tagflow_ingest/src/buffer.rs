use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tagflow_protocol::TagEvent;

/// Fixed-capacity history of the most recently processed tag events.
///
/// Insertion-ordered; once full, every push evicts the oldest entry. Only the
/// consumer pushes. Everyone else reads through [`RecencyBuffer::snapshot`], which
/// copies under the same lock `push` holds, so a snapshot never sees a
/// half-evicted buffer.
///
/// Every `clear` starts a new generation. [`RecencyBuffer::push_current`] only
/// accepts events stamped with the live generation, so an event taken off the
/// queue before a clear never reappears after it.
#[derive(Debug)]
pub struct RecencyBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<TagEvent>>,
    generation: AtomicU64,
}

impl RecencyBuffer {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TagEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, event: TagEvent) {
        let mut entries = self.lock();
        self.push_locked(&mut entries, event);
    }

    /// Push only if no clear happened since `generation` was read. Returns
    /// whether the event was kept.
    pub fn push_current(&self, event: TagEvent, generation: u64) -> bool {
        let mut entries = self.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.push_locked(&mut entries, event);
        true
    }

    fn push_locked(&self, entries: &mut VecDeque<TagEvent>, event: TagEvent) {
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Current clear generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<TagEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
