//! Rampart: traffic control and forwarding core for HTTP reverse proxies.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http (request id, timeout, record, cancellation)
//!                        │
//!                        ▼
//!                     ratelimit (RateLimiter + Strategy: admit / wait / reject)
//!                        │
//!                        ▼
//!                     upstream (rewrite, attempt loop, retry backoff)
//!                        │
//!                        ▼
//!                     load_balancer (round robin) ──▶ transport (http / https / h2c / unix)
//!                                                         │
//!     Client Response                                      ▼
//!     ◀────────────── body streamed back, slot released ── Backend Server
//! ```
//!
//! Cross-cutting: `config` (TOML), `observability` (tracing, metrics),
//! `resilience` (retry policy), `buffer_pool` (tunnel copy buffers).

pub mod buffer_pool;
pub mod config;
pub mod http;
pub mod load_balancer;
pub mod observability;
pub mod ratelimit;
pub mod resilience;
pub mod transport;
pub mod upstream;

pub use buffer_pool::BufferPool;
pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use ratelimit::{RateLimiter, Strategy};
pub use transport::Transport;
pub use upstream::{Upstream, UpstreamError};
