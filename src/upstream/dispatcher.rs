//! Reverse-proxy dispatch with bounded retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, request::Parts, Request, StatusCode},
    response::{IntoResponse, Response},
};
use http_body::Body as _;
use hyper::upgrade::OnUpgrade;
use tokio_util::sync::CancellationToken;

use crate::buffer_pool::BufferPool;
use crate::load_balancer::{RoundRobin, Target};
use crate::observability::logging::RequestRecord;
use crate::observability::metrics;
use crate::ratelimit::AdmissionHold;
use crate::resilience::backoff;
use crate::resilience::{is_retry_safe, RetryPolicy};
use crate::transport::Transport;
use crate::upstream::rewrite::remove_hop_by_hop;
use crate::upstream::{tunnel, Rewrite, SingleHost, UpstreamError};

/// Forwards requests through a transport, retrying safe requests.
#[derive(Debug, Clone)]
pub struct Upstream {
    transport: Arc<dyn Transport>,
    rewrite: Rewrite,
    retry: RetryPolicy,
    buffers: BufferPool,
}

impl Upstream {
    /// Upstream with 3 retries and a 50ms backoff factor.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            rewrite: Rewrite::default(),
            retry: RetryPolicy::default(),
            buffers: BufferPool::default(),
        }
    }

    /// Upstream sending every request to `host`.
    pub fn single_host(host: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self::new(Arc::new(SingleHost::new(host, transport)))
    }

    /// Upstream rotating over `targets`.
    pub fn round_robin(targets: Vec<Target>) -> Self {
        Self::new(Arc::new(RoundRobin::new(targets)))
    }

    /// Override the `Host` header sent upstream.
    pub fn with_host(mut self, host: &str) -> Result<Self, UpstreamError> {
        self.rewrite = self.rewrite.with_host(host)?;
        Ok(self)
    }

    /// Prefix every request path (and query) with `path`.
    pub fn with_path(mut self, path: &str) -> Self {
        self.rewrite = self.rewrite.with_path(path);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry.retries = retries;
        self
    }

    pub fn with_backoff_factor(mut self, factor: Duration) -> Self {
        self.retry.backoff_factor = factor;
        self
    }

    pub fn with_buffer_pool(mut self, buffers: BufferPool) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Forward `request`, retrying transport failures while the request is
    /// safe to replay.
    pub async fn dispatch(&self, mut request: Request<Body>) -> Result<Response, UpstreamError> {
        let start = Instant::now();
        let cancel = request.extensions().get::<CancellationToken>().cloned();

        self.rewrite.apply(&mut request)?;
        let client_upgrade = if request.headers().contains_key(header::UPGRADE) {
            request.extensions_mut().remove::<OnUpgrade>()
        } else {
            None
        };

        let replayable =
            is_retry_safe(request.method()) && request.body().size_hint().exact() == Some(0);
        let (parts, body) = request.into_parts();
        let mut body = Some(body);
        let mut attempt = 0u32;

        loop {
            let mut outbound = replay(&parts);
            if let Some(body) = body.take() {
                *outbound.body_mut() = body;
            }

            let result = match &cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => Err(UpstreamError::Canceled),
                    result = self.transport.round_trip(outbound) => result,
                },
                None => self.transport.round_trip(outbound).await,
            };

            let err = match result {
                Ok(mut response) => {
                    let status = response.status();
                    metrics::record_upstream(&upstream_label(&parts), status.as_u16(), start);
                    if status == StatusCode::SWITCHING_PROTOCOLS {
                        let upstream_upgrade = response.extensions_mut().remove::<OnUpgrade>();
                        if let (Some(client), Some(upstream)) = (client_upgrade, upstream_upgrade) {
                            let admission = parts
                                .extensions
                                .get::<AdmissionHold>()
                                .and_then(AdmissionHold::retain);
                            tunnel::spawn(client, upstream, self.buffers.clone(), admission);
                        }
                    } else {
                        remove_hop_by_hop(response.headers_mut());
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            let Some(delay) = self.retry.next_delay(attempt, replayable, &err) else {
                if let Some(status) = err.status() {
                    metrics::record_upstream(&upstream_label(&parts), status.as_u16(), start);
                }
                return Err(err);
            };

            attempt += 1;
            tracing::info!(
                attempt,
                delay = ?delay,
                error = %err,
                "Retrying upstream request"
            );
            metrics::record_retry();
            if !backoff::wait(delay, cancel.as_ref()).await {
                return Err(UpstreamError::Canceled);
            }
        }
    }

    /// Dispatch and turn failures into the client-visible response.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => error_response(&err),
        }
    }
}

/// Axum handler forwarding every request to the upstream.
pub async fn proxy_handler(
    State(upstream): State<Arc<Upstream>>,
    request: Request<Body>,
) -> Response {
    upstream.serve(request).await
}

/// Fixed short phrase for the failure class; details go to the log only.
pub fn error_response(err: &UpstreamError) -> Response {
    match err.status() {
        Some(status) => {
            tracing::error!(error = %err, status = status.as_u16(), "Upstream request failed");
            (status, status.canonical_reason().unwrap_or_default()).into_response()
        }
        None => {
            // Token cancelled by the caller. Behind the server a disconnect
            // drops the whole request future before this point.
            tracing::debug!("Client canceled request");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Fresh bodiless copy of the request head for another attempt.
fn replay(parts: &Parts) -> Request<Body> {
    let mut request = Request::new(Body::empty());
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers.clone();
    *request.extensions_mut() = parts.extensions.clone();
    request
}

fn upstream_label(parts: &Parts) -> String {
    parts
        .extensions
        .get::<RequestRecord>()
        .and_then(|record| record.get("upstream"))
        .unwrap_or_else(|| "unknown".to_string())
}
