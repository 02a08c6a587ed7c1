//! Fixed window counter.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::ratelimit::Strategy;

/// Admits at most `max` requests per key in each wall-clock window of
/// `window` length. Windows are aligned to the Unix epoch.
#[derive(Debug)]
pub struct FixedWindowStrategy {
    max: u64,
    window: Duration,
    state: Mutex<WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
    index: u128,
    counts: HashMap<String, u64>,
}

impl FixedWindowStrategy {
    pub fn new(max: u64, window: Duration) -> Self {
        Self {
            max,
            window: window.max(Duration::from_nanos(1)),
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn since_epoch() -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }

    fn window_index(&self, now: Duration) -> u128 {
        now.as_nanos() / self.window.as_nanos()
    }

    /// Increment `key` in the window containing `now`; returns the would-be count.
    fn incr(&self, key: &str, now: Duration) -> u64 {
        let index = self.window_index(now);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.index != index {
            // Rollover discards every key of the previous window
            state.index = index;
            state.counts = HashMap::new();
        }

        let current = state.counts.get(key).copied().unwrap_or(0) + 1;
        if current <= self.max {
            state.counts.insert(key.to_string(), current);
        }
        current
    }

    fn remaining_in_window(&self, now: Duration) -> Duration {
        let window = self.window.as_nanos();
        let elapsed = now.as_nanos() % window;
        let left = window - elapsed;
        Duration::from_nanos(u64::try_from(left).unwrap_or(u64::MAX))
    }

    fn after_at(&self, key: &str, now: Duration) -> Duration {
        let index = self.window_index(now);
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let used = if state.index == index {
            state.counts.get(key).copied().unwrap_or(0)
        } else {
            0
        };
        drop(state);

        if used < self.max {
            Duration::ZERO
        } else {
            self.remaining_in_window(now)
        }
    }
}

#[async_trait]
impl Strategy for FixedWindowStrategy {
    async fn take(&self, key: &str) -> bool {
        self.incr(key, Self::since_epoch()) <= self.max
    }

    fn put(&self, _key: &str) {}

    fn after(&self, key: &str) -> Duration {
        self.after_at(key, Self::since_epoch())
    }

    fn name(&self) -> &'static str {
        "fixed_window"
    }
}
