//! Transport decorator pinning every request to one host.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

use crate::observability::logging;
use crate::transport::{set_target_host, Transport};
use crate::upstream::UpstreamError;

#[derive(Debug, Clone)]
pub struct SingleHost {
    host: String,
    transport: Arc<dyn Transport>,
}

impl SingleHost {
    pub fn new(host: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            host: host.into(),
            transport,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Transport for SingleHost {
    async fn round_trip(
        &self,
        mut request: Request<Body>,
    ) -> Result<Response<Body>, UpstreamError> {
        logging::set(&request, "upstream", self.host.as_str());
        set_target_host(&mut request, self.host.clone());
        self.transport.round_trip(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::RequestRecord;
    use crate::transport::target_host;

    #[derive(Debug)]
    struct EchoHost;

    #[async_trait]
    impl Transport for EchoHost {
        async fn round_trip(
            &self,
            request: Request<Body>,
        ) -> Result<Response<Body>, UpstreamError> {
            Ok(Response::new(Body::from(target_host(&request)?)))
        }
    }

    #[tokio::test]
    async fn pins_host_and_records_it() {
        let record = RequestRecord::new();
        let mut request = Request::builder()
            .uri("http://inbound.example/")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(record.clone());

        let transport = SingleHost::new("backend:9000", Arc::new(EchoHost));
        let response = transport.round_trip(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();

        assert_eq!(&body[..], b"backend:9000");
        assert_eq!(record.get("upstream").as_deref(), Some("backend:9000"));
    }
}
