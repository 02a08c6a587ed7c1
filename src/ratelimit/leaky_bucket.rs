//! Leaky bucket pacing.
//!
//! Admissions for a key are spaced at least `per_request` apart. A request
//! arriving early reserves the next free slot and sleeps until it; at most
//! `capacity` requests per key may be sleeping at once, later ones are
//! rejected. A sleeper dropped before its slot gives the slot back when no
//! later reservation was made on top of it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::ratelimit::Strategy;

/// Minimum idle time before a key is evicted, and minimum sweep period.
const MIN_IDLE_EVICTION: Duration = Duration::from_secs(60);

type PacingMap = Mutex<HashMap<String, PacingState>>;

#[derive(Debug)]
pub struct LeakyBucketStrategy {
    per_request: Duration,
    capacity: usize,
    state: Arc<PacingMap>,
}

#[derive(Debug, Clone, Copy)]
struct PacingState {
    /// Start of the most recently reserved slot. Moves forward, except that
    /// an abandoned latest reservation is undone.
    last_serviced: Instant,
    queued: usize,
}

impl LeakyBucketStrategy {
    /// Create the strategy. When called inside a Tokio runtime, a background
    /// sweep evicting idle keys is started; it stops once the strategy is
    /// dropped.
    pub fn new(per_request: Duration, capacity: usize) -> Self {
        let strategy = Self {
            per_request,
            capacity,
            state: Arc::new(Mutex::new(HashMap::new())),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(sweep_loop(
                    Arc::downgrade(&strategy.state),
                    strategy.idle_threshold(),
                ));
            }
            Err(_) => {
                tracing::debug!("No runtime available; leaky bucket idle sweep disabled");
            }
        }

        strategy
    }

    pub fn per_request(&self) -> Duration {
        self.per_request
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys idle longer than this are evicted by the sweep.
    pub fn idle_threshold(&self) -> Duration {
        (self.per_request + Duration::from_secs(1)).max(MIN_IDLE_EVICTION)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PacingState>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve a slot for `key`. `Some(None)` admits now, `Some(Some(at))`
    /// admits at `at`, `None` rejects.
    fn reserve(&self, key: &str, now: Instant) -> Option<Option<Instant>> {
        let mut state = self.lock();
        let Some(entry) = state.get_mut(key) else {
            state.insert(
                key.to_string(),
                PacingState {
                    last_serviced: now,
                    queued: 0,
                },
            );
            return Some(None);
        };

        let next = entry.last_serviced + self.per_request;
        if now >= next {
            entry.last_serviced = now;
            return Some(None);
        }
        if entry.queued >= self.capacity {
            return None;
        }
        entry.queued += 1;
        entry.last_serviced = next;
        Some(Some(next))
    }

    /// Leave the queue. `abandoned` is the slot of a sleeper that gave up.
    fn release_queued(&self, key: &str, abandoned: Option<Instant>) {
        let mut state = self.lock();
        let Some(entry) = state.get_mut(key) else {
            return;
        };
        entry.queued = entry.queued.saturating_sub(1);
        if let Some(at) = abandoned {
            if entry.last_serviced == at {
                if let Some(previous) = at.checked_sub(self.per_request) {
                    entry.last_serviced = previous;
                }
            }
        }
    }

    /// Remove keys with an empty queue not serviced within the idle threshold.
    pub fn evict_idle(&self, now: Instant) -> usize {
        evict(&self.state, now, self.idle_threshold())
    }

    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }
}

fn evict(state: &PacingMap, now: Instant, idle: Duration) -> usize {
    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
    let before = state.len();
    state.retain(|_, entry| {
        entry.queued > 0 || now.saturating_duration_since(entry.last_serviced) <= idle
    });
    before - state.len()
}

async fn sweep_loop(state: Weak<PacingMap>, idle: Duration) {
    let mut ticker = tokio::time::interval(idle);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(state) = state.upgrade() else {
            break;
        };
        let evicted = evict(&state, Instant::now(), idle);
        if evicted > 0 {
            tracing::debug!(evicted, "Leaky bucket evicted idle keys");
        }
    }
}

/// Leaves the queue once the sleep ends or the sleeping future is dropped.
struct Sleeping<'a> {
    strategy: &'a LeakyBucketStrategy,
    key: &'a str,
    at: Instant,
    woke: bool,
}

impl Drop for Sleeping<'_> {
    fn drop(&mut self) {
        let abandoned = (!self.woke).then_some(self.at);
        self.strategy.release_queued(self.key, abandoned);
    }
}

#[async_trait]
impl Strategy for LeakyBucketStrategy {
    async fn take(&self, key: &str) -> bool {
        match self.reserve(key, Instant::now()) {
            None => false,
            Some(None) => true,
            Some(Some(at)) => {
                let mut sleeping = Sleeping {
                    strategy: self,
                    key,
                    at,
                    woke: false,
                };
                tokio::time::sleep_until(at).await;
                sleeping.woke = true;
                true
            }
        }
    }

    fn put(&self, _key: &str) {}

    fn after(&self, key: &str) -> Duration {
        let state = self.lock();
        match state.get(key) {
            Some(entry) => {
                (entry.last_serviced + self.per_request).saturating_duration_since(Instant::now())
            }
            None => Duration::ZERO,
        }
    }

    fn name(&self) -> &'static str {
        "leaky_bucket"
    }
}
