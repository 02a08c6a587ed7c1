//! Turning configuration into runtime objects.

use std::time::Duration;

use crate::config::schema::{GatewayConfig, RateLimitConfig, StrategyConfig, TransportSettings};
use crate::config::validation::parse_key_source;
use crate::load_balancer::Target;
use crate::ratelimit::RateLimiter;
use crate::transport::TransportConfig;
use crate::upstream::{Upstream, UpstreamError};

impl From<&TransportSettings> for TransportConfig {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            dial_timeout: Duration::from_millis(settings.dial_timeout_ms),
            tcp_keepalive: Duration::from_secs(settings.tcp_keepalive_secs),
            idle_timeout: Duration::from_secs(settings.idle_timeout_secs),
            response_header_timeout: Duration::from_secs(settings.response_header_timeout_secs),
            max_idle_per_host: settings.max_idle_per_host,
            tls_handshake_timeout: Duration::from_millis(settings.tls_handshake_timeout_ms),
            insecure_skip_verify: settings.insecure_skip_verify,
        }
    }
}

impl RateLimitConfig {
    /// The configured limiter, `None` when rate limiting is disabled.
    pub fn build(&self) -> Option<RateLimiter> {
        if !self.enabled {
            return None;
        }

        let limiter = match self.strategy {
            StrategyConfig::FixedWindow { max, window_ms } => {
                RateLimiter::fixed_window(max, Duration::from_millis(window_ms))
            }
            StrategyConfig::LeakyBucket {
                per_request_ms,
                capacity,
            } => RateLimiter::leaky_bucket(Duration::from_millis(per_request_ms), capacity),
            StrategyConfig::Concurrent { capacity } => RateLimiter::concurrent(capacity),
            StrategyConfig::ConcurrentQueue {
                capacity,
                queue_size,
            } => RateLimiter::concurrent_queue(capacity, queue_size),
        };

        let limiter = match parse_key_source(&self.key) {
            Some(key) => limiter.with_key(key),
            None => limiter,
        };
        Some(
            limiter
                .release_on_write_header(self.release_on_write_header)
                .release_on_upgrade(self.release_on_upgrade),
        )
    }
}

impl GatewayConfig {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::from(&self.transport)
    }

    /// Build the upstream: one target is pinned directly, several are
    /// balanced round robin.
    pub fn build_upstream(&self) -> Result<Upstream, UpstreamError> {
        let transport_config = self.transport_config();
        let targets = self
            .upstream
            .targets
            .iter()
            .map(|t| Ok(Target::new(t.host.clone(), t.transport.build(&transport_config)?)))
            .collect::<Result<Vec<_>, UpstreamError>>()?;

        let upstream = match <[Target; 1]>::try_from(targets) {
            Ok([target]) => Upstream::single_host(target.host, target.transport),
            Err(targets) => Upstream::round_robin(targets),
        };

        let upstream = upstream
            .with_path(&self.upstream.path)
            .with_retries(self.upstream.retries)
            .with_backoff_factor(Duration::from_millis(self.upstream.backoff_factor_ms));

        match &self.upstream.host {
            Some(host) => upstream.with_host(host),
            None => Ok(upstream),
        }
    }
}
