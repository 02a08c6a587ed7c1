//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → key.rs (derive admission key, e.g. client IP)
//!     → Strategy::take(key)
//!         - fixed_window.rs (N per wall-clock window)
//!         - leaky_bucket.rs (paced, one per interval, bounded queue)
//!         - concurrent.rs (N in flight, reject beyond)
//!         - concurrent_queue.rs (N in flight, bounded wait queue)
//!     → rejected: exceeded handler (429 + Retry-After)
//!     → admitted: forward, Strategy::put(key) exactly once on completion
//! ```
//!
//! # Design Decisions
//! - Each strategy owns its per-key state behind a single mutex
//! - Blocking waits release the mutex so unrelated keys are never stalled
//! - Per-key entries are pruned (window rollover, idle sweep, zero count)

pub mod concurrent;
pub mod concurrent_queue;
pub mod fixed_window;
pub mod key;
pub mod leaky_bucket;
pub mod limiter;

use std::time::Duration;

use async_trait::async_trait;

pub use concurrent::ConcurrentStrategy;
pub use concurrent_queue::ConcurrentQueueStrategy;
pub use fixed_window::FixedWindowStrategy;
pub use key::KeySource;
pub use leaky_bucket::LeakyBucketStrategy;
pub use limiter::{
    rate_limit_middleware, AdmissionGuard, AdmissionHold, ExceededHandler, RateLimiter,
};

/// A rate-limiting algorithm.
///
/// `take` may suspend the caller (queueing or pacing strategies); `put` and
/// `after` never block.
#[async_trait]
pub trait Strategy: Send + Sync + std::fmt::Debug {
    /// Try to acquire one unit of capacity for `key`. Returns `true` if admitted.
    async fn take(&self, key: &str) -> bool;

    /// Release a unit previously acquired with a successful `take`.
    fn put(&self, key: &str);

    /// Estimated wait until `take` would likely succeed. Zero when unknown.
    fn after(&self, key: &str) -> Duration;

    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;
}
