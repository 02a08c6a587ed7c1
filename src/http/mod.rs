//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, HTTP/1.1 + HTTP/2, layers)
//!     → request.rs (request ID, cancellation token)
//!     → observability::logging (request record)
//!     → ratelimit (admission)
//!     → upstream (dispatch)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{cancellation_middleware, UuidRequestId, X_REQUEST_ID};
pub use server::{shutdown_signal, GatewayServer};
