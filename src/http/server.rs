//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router forwarding every path to the upstream
//! - Configure HTTP/1.1 and HTTP/2 support (connection upgrades included)
//! - Wire up middleware (tracing, request ID, timeout, request record,
//!   cancellation, rate limiting)
//! - Bind server to listener and stop on the shutdown signal

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::HeaderName,
    middleware::{from_fn, from_fn_with_state},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::request::{cancellation_middleware, UuidRequestId, X_REQUEST_ID};
use crate::observability::logging::record_middleware;
use crate::ratelimit::{rate_limit_middleware, RateLimiter};
use crate::upstream::{proxy_handler, Upstream, UpstreamError};

/// The gateway: admission control in front of upstream dispatch.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    /// Build the gateway described by `config`.
    pub fn new(config: &GatewayConfig) -> Result<Self, UpstreamError> {
        let upstream = config.build_upstream()?;
        let limiter = config.rate_limit.build();
        Ok(Self::with_components(config, upstream, limiter))
    }

    /// Build the gateway from already constructed parts.
    pub fn with_components(
        config: &GatewayConfig,
        upstream: Upstream,
        limiter: Option<RateLimiter>,
    ) -> Self {
        let router = Self::build_router(
            Duration::from_secs(config.timeouts.request_secs),
            Arc::new(upstream),
            limiter.map(Arc::new),
        );
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        request_timeout: Duration,
        upstream: Arc<Upstream>,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Router {
        let mut router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(upstream);

        if let Some(limiter) = limiter {
            tracing::info!(strategy = limiter.strategy().name(), "Rate limiting enabled");
            router = router.layer(from_fn_with_state(limiter, rate_limit_middleware));
        }

        let request_id = HeaderName::from_static(X_REQUEST_ID);
        router
            .layer(from_fn(cancellation_middleware))
            .layer(from_fn(record_middleware))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(SetRequestIdLayer::new(request_id, UuidRequestId))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` completes.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
