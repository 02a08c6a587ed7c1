//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (plain or JSON)
//! - Carry a per-request record that inner layers add fields to
//! - Emit one access event per request with the recorded fields

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::http::request::X_REQUEST_ID;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("rampart={},tower_http={}", config.log_level, config.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

/// Fields recorded while a request is processed.
#[derive(Debug, Clone, Default)]
pub struct RequestRecord {
    fields: Arc<Mutex<BTreeMap<&'static str, String>>>,
}

impl RequestRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, field: &'static str, value: impl Into<String>) {
        self.fields
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(field, value.into());
    }

    pub fn get(&self, field: &str) -> Option<String> {
        self.fields
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(field)
            .cloned()
    }

    fn render(&self) -> String {
        let fields = self.fields.lock().unwrap_or_else(|e| e.into_inner());
        fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Record `field` on the request's log record. No-op without a record.
pub fn set<B>(request: &Request<B>, field: &'static str, value: impl Into<String>) {
    if let Some(record) = request.extensions().get::<RequestRecord>() {
        record.set(field, value);
    }
}

/// Attach a [`RequestRecord`] and log it once the response is produced.
pub async fn record_middleware(mut request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let record = RequestRecord::new();
    request.extensions_mut().insert(record.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(request).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        fields = %record.render(),
        "Request completed"
    );
    response
}
