//! Retry policy for upstream dispatch.
//!
//! # Data Flow
//! ```text
//! Attempt failed:
//!     → retries.rs (error retryable? method safe? body empty? budget left?)
//!     → backoff.rs (wait factor * 2^attempt, aborted on client cancel)
//!     → next attempt through the load balancer
//! ```
//!
//! # Design Decisions
//! - Only safe methods with no request body are replayed
//! - "Unavailable" is terminal; there is nothing to retry against
//! - Backoff is deterministic (no jitter) so the wait schedule is predictable

pub mod backoff;
pub mod retries;

pub use backoff::{backoff, wait};
pub use retries::{is_retry_safe, RetryPolicy};
