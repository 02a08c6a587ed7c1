//! Rate limiting middleware.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body::{Frame, SizeHint};

use crate::observability::metrics;
use crate::ratelimit::{
    ConcurrentQueueStrategy, ConcurrentStrategy, FixedWindowStrategy, KeySource,
    LeakyBucketStrategy, Strategy,
};

/// Builds the rejection response from the request and the strategy's wait
/// estimate.
pub type ExceededHandler = Arc<dyn Fn(&Request<Body>, Duration) -> Response + Send + Sync>;

/// Gates requests through a [`Strategy`], one bucket per admission key.
#[derive(Clone)]
pub struct RateLimiter {
    key: KeySource,
    strategy: Arc<dyn Strategy>,
    exceeded: ExceededHandler,
    release_on_write_header: bool,
    release_on_upgrade: bool,
}

impl RateLimiter {
    /// Limiter keyed by client IP with the default 429 handler.
    pub fn new(strategy: Arc<dyn Strategy>) -> Self {
        Self {
            key: KeySource::default(),
            strategy,
            exceeded: Arc::new(default_exceeded),
            release_on_write_header: false,
            release_on_upgrade: false,
        }
    }

    pub fn fixed_window(max: u64, window: Duration) -> Self {
        Self::new(Arc::new(FixedWindowStrategy::new(max, window)))
    }

    pub fn per_second(max: u64) -> Self {
        Self::fixed_window(max, Duration::from_secs(1))
    }

    pub fn per_minute(max: u64) -> Self {
        Self::fixed_window(max, Duration::from_secs(60))
    }

    pub fn per_hour(max: u64) -> Self {
        Self::fixed_window(max, Duration::from_secs(3600))
    }

    pub fn leaky_bucket(per_request: Duration, capacity: usize) -> Self {
        Self::new(Arc::new(LeakyBucketStrategy::new(per_request, capacity)))
    }

    pub fn concurrent(capacity: usize) -> Self {
        Self::new(Arc::new(ConcurrentStrategy::new(capacity)))
    }

    pub fn concurrent_queue(capacity: usize, queue_size: usize) -> Self {
        Self::new(Arc::new(ConcurrentQueueStrategy::new(capacity, queue_size)))
    }

    pub fn with_key(mut self, key: KeySource) -> Self {
        self.key = key;
        self
    }

    pub fn with_exceeded_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request<Body>, Duration) -> Response + Send + Sync + 'static,
    {
        self.exceeded = Arc::new(handler);
        self
    }

    /// Release the slot as soon as the response head is produced instead of
    /// when the response body finishes. Suited to connection-bound strategies.
    pub fn release_on_write_header(mut self, enabled: bool) -> Self {
        self.release_on_write_header = enabled;
        self
    }

    /// Release the slot when the connection is upgraded instead of when the
    /// upgraded tunnel closes.
    pub fn release_on_upgrade(mut self, enabled: bool) -> Self {
        self.release_on_upgrade = enabled;
        self
    }

    pub fn strategy(&self) -> &Arc<dyn Strategy> {
        &self.strategy
    }

    /// Admit `request` and run `next`, or answer with the exceeded handler.
    ///
    /// The acquired slot is released exactly once: when the response body is
    /// finished or dropped, when `next` panics or is cancelled, or right after
    /// `next` returns if `release_on_write_header` is set. A connection that
    /// retained the [`AdmissionHold`] (an upgrade tunnel) keeps the slot until
    /// it drops its guard, unless `release_on_upgrade` is set.
    pub async fn admit<F, Fut>(&self, mut request: Request<Body>, next: F) -> Response
    where
        F: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response>,
    {
        let key = self.key.key(&request);

        if !self.strategy.take(&key).await {
            let after = self.strategy.after(&key);
            tracing::warn!(
                key = %key,
                strategy = self.strategy.name(),
                retry_after_ms = after.as_millis() as u64,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(self.strategy.name());
            return (self.exceeded)(&request, after);
        }

        let release = Arc::new(Release {
            strategy: Arc::clone(&self.strategy),
            key,
        });
        if !self.release_on_upgrade {
            request
                .extensions_mut()
                .insert(AdmissionHold(Arc::downgrade(&release)));
        }

        let response = next(request).await;

        if self.release_on_write_header {
            drop(release);
            return response;
        }

        let (parts, body) = response.into_parts();
        Response::from_parts(
            parts,
            Body::new(ReleaseOnEnd {
                inner: body,
                _release: release,
            }),
        )
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("key", &self.key)
            .field("strategy", &self.strategy)
            .field("release_on_write_header", &self.release_on_write_header)
            .field("release_on_upgrade", &self.release_on_upgrade)
            .finish_non_exhaustive()
    }
}

/// Axum middleware entry point.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limiter.admit(request, |req| next.run(req)).await
}

/// `429 Too Many Requests`, with `Retry-After` in whole seconds (rounded up)
/// when a positive wait is known.
pub fn default_exceeded(_request: &Request<Body>, after: Duration) -> Response {
    let mut response = (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
    if after > Duration::ZERO {
        let secs = after.as_secs() + u64::from(after.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// Returns the admission slot when dropped.
#[derive(Debug)]
struct Release {
    strategy: Arc<dyn Strategy>,
    key: String,
}

/// Request extension through which a connection outliving its response can
/// keep the admission slot.
#[derive(Debug, Clone)]
pub struct AdmissionHold(Weak<Release>);

impl AdmissionHold {
    /// Keep the slot until the returned guard is dropped. `None` once the
    /// slot has already been released.
    pub fn retain(&self) -> Option<AdmissionGuard> {
        self.0.upgrade().map(AdmissionGuard)
    }
}

/// Holds an admission slot; the slot is released when the last holder drops.
#[derive(Debug)]
pub struct AdmissionGuard(#[allow(dead_code)] Arc<Release>);

impl Drop for Release {
    fn drop(&mut self) {
        self.strategy.put(&self.key);
    }
}

/// Response body that holds the admission slot until it is finished or dropped.
struct ReleaseOnEnd {
    inner: Body,
    _release: Arc<Release>,
}

impl http_body::Body for ReleaseOnEnd {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        http_body::Body::poll_frame(Pin::new(&mut self.get_mut().inner), cx)
    }

    fn is_end_stream(&self) -> bool {
        http_body::Body::is_end_stream(&self.inner)
    }

    fn size_hint(&self) -> SizeHint {
        http_body::Body::size_hint(&self.inner)
    }
}
