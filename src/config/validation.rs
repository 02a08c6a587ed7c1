//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals and capacities > 0)
//! - Check addresses, path prefix and key source syntax
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, StrategyConfig};
use crate::ratelimit::KeySource;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {value:?} is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("rate_limit.key: unknown key source {0:?}")]
    UnknownKeySource(String),

    #[error("upstream.path: {0:?} must start with '/'")]
    InvalidPath(String),

    #[error("upstream.targets[{0}].host is empty")]
    EmptyTargetHost(usize),
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    if parse_key_source(&config.rate_limit.key).is_none() {
        errors.push(ValidationError::UnknownKeySource(config.rate_limit.key.clone()));
    }
    match config.rate_limit.strategy {
        StrategyConfig::FixedWindow { max, window_ms } => {
            if max == 0 {
                errors.push(ValidationError::Zero("rate_limit.strategy.max"));
            }
            if window_ms == 0 {
                errors.push(ValidationError::Zero("rate_limit.strategy.window_ms"));
            }
        }
        StrategyConfig::LeakyBucket { per_request_ms, .. } => {
            if per_request_ms == 0 {
                errors.push(ValidationError::Zero("rate_limit.strategy.per_request_ms"));
            }
        }
        StrategyConfig::Concurrent { capacity } => {
            if capacity == 0 {
                errors.push(ValidationError::Zero("rate_limit.strategy.capacity"));
            }
        }
        StrategyConfig::ConcurrentQueue {
            capacity,
            queue_size,
        } => {
            if capacity == 0 {
                errors.push(ValidationError::Zero("rate_limit.strategy.capacity"));
            }
            if queue_size == 0 {
                errors.push(ValidationError::Zero("rate_limit.strategy.queue_size"));
            }
        }
    }

    if !config.upstream.path.is_empty() && !config.upstream.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath(config.upstream.path.clone()));
    }
    for (i, target) in config.upstream.targets.iter().enumerate() {
        if target.host.trim().is_empty() {
            errors.push(ValidationError::EmptyTargetHost(i));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse `client_ip`, `header:<name>` or `none`.
pub fn parse_key_source(key: &str) -> Option<KeySource> {
    match key {
        "client_ip" => Some(KeySource::ClientIp),
        "none" => Some(KeySource::Constant(String::new())),
        _ => {
            let name = key.strip_prefix("header:")?;
            HeaderName::from_bytes(name.trim().as_bytes())
                .ok()
                .map(KeySource::Header)
        }
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TargetConfig;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.rate_limit.key = "cookie:session".into();
        config.rate_limit.strategy = StrategyConfig::ConcurrentQueue {
            capacity: 0,
            queue_size: 0,
        };
        config.upstream.path = "api".into();
        config.upstream.targets = vec![TargetConfig {
            host: " ".into(),
            transport: Default::default(),
        }];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidAddress {
                    field: "listener.bind_address",
                    value: "nowhere".into()
                },
                ValidationError::UnknownKeySource("cookie:session".into()),
                ValidationError::Zero("rate_limit.strategy.capacity"),
                ValidationError::Zero("rate_limit.strategy.queue_size"),
                ValidationError::InvalidPath("api".into()),
                ValidationError::EmptyTargetHost(0),
            ]
        );
    }

    #[test]
    fn zero_intervals() {
        let mut config = GatewayConfig::default();
        config.rate_limit.strategy = StrategyConfig::FixedWindow {
            max: 1,
            window_ms: 0,
        };
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::Zero("rate_limit.strategy.window_ms")]
        );

        config.rate_limit.strategy = StrategyConfig::LeakyBucket {
            per_request_ms: 0,
            capacity: 0,
        };
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::Zero("rate_limit.strategy.per_request_ms")]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_address = "bad".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn key_sources() {
        assert!(matches!(parse_key_source("client_ip"), Some(KeySource::ClientIp)));
        assert!(matches!(parse_key_source("none"), Some(KeySource::Constant(k)) if k.is_empty()));
        assert!(matches!(
            parse_key_source("header:X-Api-Key"),
            Some(KeySource::Header(name)) if name == "x-api-key"
        ));
        assert!(parse_key_source("header:bad header").is_none());
        assert!(parse_key_source("ip").is_none());
    }
}
