//! Retry eligibility.
//!
//! # Responsibilities
//! - Decide whether a failed attempt may be replayed
//! - Hold the retry budget and backoff factor
//!
//! # Design Decisions
//! - Only GET/HEAD/OPTIONS/TRACE are replayed; others are sent once
//! - A request with a body is never replayed, it cannot be rewound
//! - Connection and timeout errors are retryable, "unavailable" is not

use std::time::Duration;

use axum::http::Method;

use crate::resilience::backoff::backoff;
use crate::upstream::UpstreamError;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_millis(50);

/// Methods that may be sent more than once.
pub fn is_retry_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub retries: u32,
    /// Base of the exponential backoff.
    pub backoff_factor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Delay before another attempt after failed attempt `attempt`
    /// (zero-based), or `None` when the failure is final.
    pub fn next_delay(
        &self,
        attempt: u32,
        replayable: bool,
        error: &UpstreamError,
    ) -> Option<Duration> {
        if !replayable || !error.is_retryable() || attempt >= self.retries {
            return None;
        }
        Some(backoff(attempt, self.backoff_factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_err() -> UpstreamError {
        UpstreamError::transport("connection refused")
    }

    #[test]
    fn safe_methods() {
        assert!(is_retry_safe(&Method::GET));
        assert!(is_retry_safe(&Method::HEAD));
        assert!(is_retry_safe(&Method::OPTIONS));
        assert!(is_retry_safe(&Method::TRACE));
        assert!(!is_retry_safe(&Method::POST));
        assert!(!is_retry_safe(&Method::PUT));
        assert!(!is_retry_safe(&Method::PATCH));
        assert!(!is_retry_safe(&Method::DELETE));
    }

    #[test]
    fn schedule_then_exhausted() {
        let policy = RetryPolicy::default();
        let err = transport_err();
        assert_eq!(policy.next_delay(0, true, &err), Some(Duration::from_millis(50)));
        assert_eq!(policy.next_delay(1, true, &err), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2, true, &err), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3, true, &err), None);
    }

    #[test]
    fn final_failures() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(0, false, &transport_err()), None);
        assert_eq!(policy.next_delay(0, true, &UpstreamError::Unavailable), None);
        assert_eq!(policy.next_delay(0, true, &UpstreamError::Canceled), None);

        let none = RetryPolicy {
            retries: 0,
            ..Default::default()
        };
        assert_eq!(none.next_delay(0, true, &transport_err()), None);
    }
}
