//! Concurrent in-flight limit.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::ratelimit::Strategy;

/// Allows at most `capacity` in-flight requests per key; excess requests are
/// rejected immediately.
#[derive(Debug)]
pub struct ConcurrentStrategy {
    capacity: usize,
    in_flight: Mutex<HashMap<String, usize>>,
}

impl ConcurrentStrategy {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn try_take(&self, key: &str) -> bool {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let current = in_flight.get(key).copied().unwrap_or(0);
        if current >= self.capacity {
            return false;
        }
        in_flight.insert(key.to_string(), current + 1);
        true
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }
}

#[async_trait]
impl Strategy for ConcurrentStrategy {
    async fn take(&self, key: &str) -> bool {
        self.try_take(key)
    }

    fn put(&self, key: &str) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = in_flight.get_mut(key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_flight.remove(key);
            }
        }
    }

    /// Completion time of in-flight requests is unknown.
    fn after(&self, _key: &str) -> Duration {
        Duration::ZERO
    }

    fn name(&self) -> &'static str {
        "concurrent"
    }
}
