//! Upstream dispatch.
//!
//! # Data Flow
//! ```text
//! Admitted request
//!     → rewrite.rs (prefix path, merge query, Host, hop-by-hop headers)
//!     → dispatcher.rs (attempt loop)
//!         → Transport (SingleHost / RoundRobin → protocol transport)
//!         → on retryable failure: backoff, then next attempt
//!     → 101 response: tunnel.rs joins both upgraded connections
//!     → terminal failure: 503 / 502 with a fixed phrase, or nothing on cancel
//! ```
//!
//! # Design Decisions
//! - The dispatcher never buffers request bodies; only bodiless requests retry
//! - Error detail stays in the logs, clients see the status phrase only
//! - The chosen backend host is recorded on the request log record

pub mod dispatcher;
pub mod error;
pub mod rewrite;
pub mod single_host;
pub mod tunnel;

pub use dispatcher::{proxy_handler, Upstream};
pub use error::UpstreamError;
pub use rewrite::Rewrite;
pub use single_host::SingleHost;
