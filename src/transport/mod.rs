//! Outbound transports.
//!
//! # Data Flow
//! ```text
//! Upstream dispatcher (request rewritten, target host attached)
//!     → Transport::round_trip
//!         - http.rs  (keep-alive pool over TCP)
//!         - https.rs (same, plus TLS client config)
//!         - h2c.rs   (HTTP/2 prior knowledge, HTTP/1.1 for Upgrade)
//!         - unix.rs  (HTTP/1.1 over a Unix-domain socket)
//!     → Response head within the response-header timeout, body streamed
//! ```
//!
//! # Design Decisions
//! - Connection pools are built eagerly when the transport is constructed
//! - The target host travels as a request extension, not inside the URI,
//!   so hosts that are filesystem paths work too
//! - No response decompression; bodies pass through untouched

pub mod h2c;
pub mod http;
pub mod https;
pub mod unix;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri};
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use serde::{Deserialize, Serialize};

use crate::upstream::UpstreamError;

pub use h2c::H2cTransport;
pub use http::HttpTransport;
pub use https::HttpsTransport;
pub use unix::UnixTransport;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TCP_KEEPALIVE: Duration = Duration::from_secs(60);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 32;
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends one request to a backend and returns its response head.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn round_trip(
        &self,
        request: Request<Body>,
    ) -> Result<Response<Body>, UpstreamError> {
        (**self).round_trip(request).await
    }
}

/// Backend host a request is addressed to, attached as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHost(pub String);

/// Address `request` to `host`.
pub fn set_target_host<B>(request: &mut Request<B>, host: impl Into<String>) {
    request.extensions_mut().insert(TargetHost(host.into()));
}

/// Host attached by a load balancer or single-host wrapper, falling back to
/// the URI authority.
pub fn target_host<B>(request: &Request<B>) -> Result<String, UpstreamError> {
    if let Some(TargetHost(host)) = request.extensions().get::<TargetHost>() {
        return Ok(host.clone());
    }
    request
        .uri()
        .authority()
        .map(|a| a.to_string())
        .ok_or_else(|| UpstreamError::InvalidRequest("no upstream host".into()))
}

/// Replace scheme and authority of the request URI, keeping path and query.
pub(crate) fn set_uri<B>(
    request: &mut Request<B>,
    scheme: Scheme,
    authority: &str,
) -> Result<(), UpstreamError> {
    let authority = Authority::from_str(authority)
        .map_err(|e| UpstreamError::InvalidRequest(format!("host {authority:?}: {e}")))?;
    let path_and_query = request
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    let uri = Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
    *request.uri_mut() = uri;
    Ok(())
}

/// Connection pool settings shared by every transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub dial_timeout: Duration,
    pub tcp_keepalive: Duration,
    pub idle_timeout: Duration,
    pub response_header_timeout: Duration,
    pub max_idle_per_host: usize,
    pub tls_handshake_timeout: Duration,
    /// Skip certificate verification for HTTPS targets.
    pub insecure_skip_verify: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            tcp_keepalive: DEFAULT_TCP_KEEPALIVE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            response_header_timeout: DEFAULT_RESPONSE_HEADER_TIMEOUT,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            tls_handshake_timeout: DEFAULT_TLS_HANDSHAKE_TIMEOUT,
            insecure_skip_verify: false,
        }
    }
}

impl TransportConfig {
    pub(crate) fn http_connector(&self) -> HttpConnector {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(self.dial_timeout));
        connector.set_keepalive(Some(self.tcp_keepalive));
        connector.set_nodelay(true);
        connector
    }

    pub(crate) fn client<C>(&self, connector: C, http2_only: bool) -> Client<C, Body>
    where
        C: Connect + Clone + Send + Sync + 'static,
    {
        Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.idle_timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_timer(TokioTimer::new())
            .http2_only(http2_only)
            .build(connector)
    }
}

/// Protocol used to reach a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Http,
    Https,
    H2c,
    Unix,
}

impl TransportKind {
    /// Build a transport of this kind.
    pub fn build(self, config: &TransportConfig) -> Result<Arc<dyn Transport>, UpstreamError> {
        Ok(match self {
            Self::Http => Arc::new(HttpTransport::new(config)),
            Self::Https => Arc::new(HttpsTransport::new(config)?),
            Self::H2c => Arc::new(H2cTransport::new(config)),
            Self::Unix => Arc::new(UnixTransport::new(config)),
        })
    }
}

/// Send through `client`, bounding the wait for response headers.
pub(crate) async fn send<C>(
    client: &Client<C, Body>,
    request: Request<Body>,
    header_timeout: Duration,
) -> Result<Response<Body>, UpstreamError>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    match tokio::time::timeout(header_timeout, client.request(request)).await {
        Ok(Ok(response)) => Ok(response.map(Body::new)),
        Ok(Err(e)) => Err(UpstreamError::transport(e)),
        Err(_) => Err(UpstreamError::Timeout(header_timeout)),
    }
}
