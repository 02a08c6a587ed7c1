//! Configuration schema definitions.
//!
//! Every section is optional in the file; missing fields take the defaults
//! below.

use serde::{Deserialize, Serialize};

use crate::transport::TransportKind;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub listener: ListenerConfig,
    pub timeouts: TimeoutConfig,
    pub rate_limit: RateLimitConfig,
    pub upstream: UpstreamConfig,
    pub transport: TransportSettings,
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Inbound request deadline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed per request, admission wait included.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Admission control.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Release the slot when the response head is produced.
    pub release_on_write_header: bool,

    /// Release the slot when the connection is upgraded rather than when the
    /// upgraded tunnel closes.
    pub release_on_upgrade: bool,

    /// `client_ip`, `header:<name>` or `none` (one shared bucket).
    pub key: String,

    pub strategy: StrategyConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            release_on_write_header: false,
            release_on_upgrade: false,
            key: "client_ip".to_string(),
            strategy: StrategyConfig::default(),
        }
    }
}

/// Rate limiting algorithm and its parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    FixedWindow {
        max: u64,
        #[serde(default = "default_window_ms")]
        window_ms: u64,
    },
    LeakyBucket {
        per_request_ms: u64,
        #[serde(default)]
        capacity: usize,
    },
    Concurrent {
        capacity: usize,
    },
    ConcurrentQueue {
        capacity: usize,
        queue_size: usize,
    },
}

fn default_window_ms() -> u64 {
    1000
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::FixedWindow {
            max: 100,
            window_ms: default_window_ms(),
        }
    }
}

/// Where and how requests are forwarded.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Override for the `Host` header.
    pub host: Option<String>,

    /// Target path prefix, may carry a query.
    pub path: String,

    pub retries: u32,

    pub backoff_factor_ms: u64,

    pub targets: Vec<TargetConfig>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: None,
            path: "/".to_string(),
            retries: 3,
            backoff_factor_ms: 50,
            targets: Vec::new(),
        }
    }
}

/// One backend.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TargetConfig {
    /// `host:port`, or a socket path for `unix`.
    pub host: String,

    #[serde(default)]
    pub transport: TransportKind,
}

/// Outbound connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransportSettings {
    pub dial_timeout_ms: u64,
    pub idle_timeout_secs: u64,
    pub response_header_timeout_secs: u64,
    pub max_idle_per_host: usize,
    pub tls_handshake_timeout_ms: u64,
    pub tcp_keepalive_secs: u64,
    pub insecure_skip_verify: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 5000,
            idle_timeout_secs: 600,
            response_header_timeout_secs: 60,
            max_idle_per_host: 32,
            tls_handshake_timeout_ms: 5000,
            tcp_keepalive_secs: 60,
            insecure_skip_verify: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Serve Prometheus metrics.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
