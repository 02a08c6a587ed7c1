//! Upstream failure taxonomy.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a request could not be forwarded.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No backend target exists. Never retried.
    #[error("upstream: unavailable")]
    Unavailable,

    /// Dial, TLS or protocol failure.
    #[error("upstream: {0}")]
    Transport(#[source] BoxError),

    /// Response headers did not arrive in time.
    #[error("upstream: no response headers within {0:?}")]
    Timeout(Duration),

    /// The outbound request could not be built.
    #[error("upstream: invalid request: {0}")]
    InvalidRequest(String),

    /// The client went away; nothing is written back.
    #[error("upstream: client canceled request")]
    Canceled,
}

impl UpstreamError {
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transport(err.into())
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    /// Client-visible status. `None` means no response is written.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unavailable => Some(StatusCode::SERVICE_UNAVAILABLE),
            Self::Canceled => None,
            Self::Transport(_) | Self::Timeout(_) | Self::InvalidRequest(_) => {
                Some(StatusCode::BAD_GATEWAY)
            }
        }
    }
}
