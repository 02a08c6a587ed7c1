//! Concurrent in-flight limit with a bounded wait queue.
//!
//! Requests beyond `capacity` wait for a slot; once `queue_size` requests are
//! already waiting (or acquiring) for a key, further requests are rejected.
//!
//! Wake order follows the slot semaphore and is approximately first-in,
//! first-out.
//!
//! Deliberate deviation: a waiter whose future is dropped (client gone,
//! request timeout) gives its queue position back immediately instead of
//! holding it until a slot would have been granted. The in-flight bound is
//! unaffected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::ratelimit::Strategy;

#[derive(Debug)]
pub struct ConcurrentQueueStrategy {
    capacity: usize,
    queue_size: usize,
    entries: Mutex<HashMap<String, QueueEntry>>,
}

#[derive(Debug)]
struct QueueEntry {
    slots: Arc<Semaphore>,
    /// Admitted plus waiting requests.
    processing: usize,
    /// Requests that passed the queue check but do not hold a slot yet.
    queued: usize,
}

impl QueueEntry {
    fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            processing: 0,
            queued: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.processing == 0 && self.queued == 0
    }
}

impl ConcurrentQueueStrategy {
    pub fn new(capacity: usize, queue_size: usize) -> Self {
        Self {
            capacity,
            queue_size,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, QueueEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `key` as queued. Returns the slot pool to wait on, or `None`
    /// when the queue is full.
    fn enqueue(&self, key: &str) -> Option<Arc<Semaphore>> {
        let mut entries = self.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| QueueEntry::new(self.capacity));

        if entry.queued >= self.queue_size {
            if entry.is_idle() {
                entries.remove(key);
            }
            return None;
        }
        entry.processing += 1;
        entry.queued += 1;
        Some(Arc::clone(&entry.slots))
    }

    fn dequeue(&self, key: &str, admitted: bool) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.queued = entry.queued.saturating_sub(1);
            if !admitted {
                entry.processing = entry.processing.saturating_sub(1);
                if entry.is_idle() {
                    entries.remove(key);
                }
            }
        }
    }

    #[cfg(test)]
    fn snapshot(&self, key: &str) -> Option<(usize, usize)> {
        self.lock().get(key).map(|e| (e.processing, e.queued))
    }
}

/// Undoes the queue registration if the waiting future is dropped.
struct Waiting<'a> {
    strategy: &'a ConcurrentQueueStrategy,
    key: &'a str,
    armed: bool,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(key = %self.key, "Queued admission abandoned");
            self.strategy.dequeue(self.key, false);
        }
    }
}

#[async_trait]
impl Strategy for ConcurrentQueueStrategy {
    async fn take(&self, key: &str) -> bool {
        let Some(slots) = self.enqueue(key) else {
            return false;
        };

        let mut waiting = Waiting {
            strategy: self,
            key,
            armed: true,
        };

        // The map lock is not held here; other keys and `put` proceed.
        match slots.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return false,
        }

        waiting.armed = false;
        self.dequeue(key, true);
        true
    }

    fn put(&self, key: &str) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.processing <= entry.queued {
            // Nothing admitted for this key
            return;
        }

        entry.slots.add_permits(1);
        entry.processing -= 1;
        if entry.is_idle() {
            entries.remove(key);
        }
    }

    /// Completion time of in-flight requests is unknown.
    fn after(&self, _key: &str) -> Duration {
        Duration::ZERO
    }

    fn name(&self) -> &'static str {
        "concurrent_queue"
    }
}
