//! Load balancing across backend targets.
//!
//! # Data Flow
//! ```text
//! Upstream dispatcher (one attempt)
//!     → round_robin.rs (next target, lock-free)
//!     → target host attached to the request, `upstream` log field set
//!     → Target's transport round trip
//! ```
//!
//! # Design Decisions
//! - Targets are fixed at construction; no live add/remove
//! - A balancer is itself a Transport, so retries re-pick a target
//! - No health filtering; failed attempts are retried on the next target

pub mod round_robin;

use std::sync::Arc;

use crate::transport::Transport;

pub use round_robin::RoundRobin;

/// A backend host bound to the transport used to reach it.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub transport: Arc<dyn Transport>,
}

impl Target {
    pub fn new(host: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            host: host.into(),
            transport,
        }
    }
}
