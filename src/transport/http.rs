//! Plain HTTP/1.1 over TCP with keep-alive pooling.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;

use crate::transport::{send, set_uri, target_host, Transport, TransportConfig};
use crate::upstream::UpstreamError;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
    header_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            client: config.client(config.http_connector(), false),
            header_timeout: config.response_header_timeout,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn round_trip(
        &self,
        mut request: Request<Body>,
    ) -> Result<Response<Body>, UpstreamError> {
        let host = target_host(&request)?;
        set_uri(&mut request, Scheme::HTTP, &host)?;
        send(&self.client, request, self.header_timeout).await
    }
}
