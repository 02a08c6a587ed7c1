//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rampart_rate_limited_total` (counter): rejected admissions by strategy
//! - `rampart_upstream_requests_total` (counter): forwarded requests by upstream, status
//! - `rampart_upstream_retries_total` (counter): retry attempts
//! - `rampart_upstream_duration_seconds` (histogram): dispatch latency by upstream

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_rate_limited(strategy: &'static str) {
    counter!("rampart_rate_limited_total", "strategy" => strategy).increment(1);
}

pub fn record_upstream(upstream: &str, status: u16, start: Instant) {
    counter!(
        "rampart_upstream_requests_total",
        "upstream" => upstream.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("rampart_upstream_duration_seconds", "upstream" => upstream.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_retry() {
    counter!("rampart_upstream_retries_total").increment(1);
}
