//! Exponential backoff.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Delay before retry number `attempt + 1`: `factor * 2^attempt`.
pub fn backoff(attempt: u32, factor: Duration) -> Duration {
    factor.saturating_mul(2u32.saturating_pow(attempt))
}

/// Sleep for `delay` unless `cancel` fires first. Returns `false` when
/// cancelled.
pub async fn wait(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}
