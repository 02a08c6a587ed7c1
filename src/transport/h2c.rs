//! Cleartext HTTP/2 with prior knowledge.
//!
//! HTTP/2 has no `Upgrade` mechanism, so requests carrying an `Upgrade`
//! header (WebSocket handshakes and the like) go out over HTTP/1.1 instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{header, Request, Response, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;

use crate::transport::{send, set_uri, target_host, HttpTransport, Transport, TransportConfig};
use crate::upstream::UpstreamError;

#[derive(Debug, Clone)]
pub struct H2cTransport {
    h2: Arc<dyn Transport>,
    h1: Arc<dyn Transport>,
}

impl H2cTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            h2: Arc::new(PriorKnowledge {
                client: config.client(config.http_connector(), true),
                header_timeout: config.response_header_timeout,
            }),
            h1: Arc::new(HttpTransport::new(config)),
        }
    }

    /// Use `h2` for ordinary requests and `h1` for upgrades.
    pub fn with_transports(h2: Arc<dyn Transport>, h1: Arc<dyn Transport>) -> Self {
        Self { h2, h1 }
    }
}

#[async_trait]
impl Transport for H2cTransport {
    async fn round_trip(
        &self,
        request: Request<Body>,
    ) -> Result<Response<Body>, UpstreamError> {
        if request.headers().contains_key(header::UPGRADE) {
            tracing::debug!("Upgrade requested; using HTTP/1.1 for h2c target");
            return self.h1.round_trip(request).await;
        }
        self.h2.round_trip(request).await
    }
}

#[derive(Debug)]
struct PriorKnowledge {
    client: Client<HttpConnector, Body>,
    header_timeout: Duration,
}

#[async_trait]
impl Transport for PriorKnowledge {
    async fn round_trip(
        &self,
        mut request: Request<Body>,
    ) -> Result<Response<Body>, UpstreamError> {
        let host = target_host(&request)?;
        set_uri(&mut request, Scheme::HTTP, &host)?;
        *request.version_mut() = Version::HTTP_2;
        send(&self.client, request, self.header_timeout).await
    }
}
