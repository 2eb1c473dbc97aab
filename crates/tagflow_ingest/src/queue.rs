use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tagflow_protocol::TagEvent;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was at capacity; `rejected` trailing events were not enqueued.
    #[error("Ingest queue full (capacity {capacity}): {rejected} event(s) dropped")]
    Full { capacity: usize, rejected: usize },
}

/// FIFO hand-off from the reader's callback thread to the single consumer.
///
/// `put`/`put_batch` hold the lock only long enough to append, so the producer
/// never waits on sink I/O. `get` parks the consumer on a condvar for at most
/// the given timeout.
#[derive(Debug)]
pub struct IngestQueue {
    capacity: Option<usize>,
    events: Mutex<VecDeque<TagEvent>>,
    not_empty: Condvar,
}

impl IngestQueue {
    /// `None` for an unbounded queue.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TagEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, event: TagEvent) -> Result<(), QueueError> {
        self.put_batch(vec![event]).map(|_| ())
    }

    /// Append a whole report under one lock, preserving its order.
    ///
    /// On a bounded queue the longest prefix that fits is enqueued and the rest is
    /// reported as [`QueueError::Full`].
    pub fn put_batch(&self, batch: Vec<TagEvent>) -> Result<usize, QueueError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let total = batch.len();
        let accepted = {
            let mut events = self.lock();
            let room = match self.capacity {
                Some(cap) => cap.saturating_sub(events.len()),
                None => total,
            };
            let accepted = total.min(room);
            events.extend(batch.into_iter().take(accepted));
            accepted
        };
        if accepted > 0 {
            self.not_empty.notify_one();
        }
        match self.capacity {
            Some(capacity) if accepted < total => Err(QueueError::Full {
                capacity,
                rejected: total - accepted,
            }),
            _ => Ok(accepted),
        }
    }

    /// Take the oldest event, waiting up to `timeout`. `None` on timeout.
    pub fn get(&self, timeout: Duration) -> Option<TagEvent> {
        self.get_with(timeout, || ()).map(|(event, ())| event)
    }

    /// Like [`IngestQueue::get`], but runs `on_take` while the queue lock is still
    /// held, so whatever it records is ordered with respect to a concurrent
    /// [`IngestQueue::clear`].
    pub fn get_with<T>(
        &self,
        timeout: Duration,
        on_take: impl FnOnce() -> T,
    ) -> Option<(TagEvent, T)> {
        let events = self.lock();
        let (mut events, _) = self
            .not_empty
            .wait_timeout_while(events, timeout, |q| q.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let event = events.pop_front()?;
        Some((event, on_take()))
    }

    /// Take the oldest event without waiting.
    pub fn try_get(&self) -> Option<TagEvent> {
        self.try_get_with(|| ()).map(|(event, ())| event)
    }

    pub fn try_get_with<T>(&self, on_take: impl FnOnce() -> T) -> Option<(TagEvent, T)> {
        let mut events = self.lock();
        let event = events.pop_front()?;
        Some((event, on_take()))
    }

    /// Discard everything queued; returns how many events were dropped.
    pub fn clear(&self) -> usize {
        let mut events = self.lock();
        let dropped = events.len();
        events.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
