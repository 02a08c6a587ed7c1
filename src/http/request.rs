//! Per-request context attached before dispatch.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) unless the client sent one
//! - Attach a cancellation token that fires when the request is abandoned
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The token fires on drop of the request future, which is how a client
//!   disconnect or the request timeout surfaces. Under the server the drop
//!   itself already stops dispatch; the token reaches work that outlives the
//!   request future (tasks spawned with a clone) and callers that drive
//!   `Upstream::dispatch` directly with their own token

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Makes UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Attach a [`CancellationToken`] cancelled once this request is finished
/// or dropped.
pub async fn cancellation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let token = CancellationToken::new();
    let _cancel_on_drop = token.clone().drop_guard();
    request.extensions_mut().insert(token);
    next.run(request).await
}
