//! Admission key extraction.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};

/// Header a trusted front proxy sets to the real client address.
pub const X_REAL_IP: &str = "x-real-ip";

type KeyFn = dyn Fn(&Request<Body>) -> String + Send + Sync;

/// Where the admission key of a request comes from.
#[derive(Clone, Default)]
pub enum KeySource {
    /// Client address, see [`client_ip`].
    #[default]
    ClientIp,
    /// Value of a request header (empty when absent).
    Header(HeaderName),
    /// Every request shares one bucket.
    Constant(String),
    /// Arbitrary extraction function.
    Custom(Arc<KeyFn>),
}

impl KeySource {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Request<Body>) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Derive the admission key for `req`.
    pub fn key(&self, req: &Request<Body>) -> String {
        match self {
            Self::ClientIp => client_ip(req),
            Self::Header(name) => req
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            Self::Constant(key) => key.clone(),
            Self::Custom(f) => f(req),
        }
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientIp => f.write_str("ClientIp"),
            Self::Header(name) => f.debug_tuple("Header").field(name).finish(),
            Self::Constant(key) => f.debug_tuple("Constant").field(key).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Client address of a request.
///
/// Prefers `X-Real-Ip` (normalized when it parses as an IP, verbatim when it
/// does not), then the connection peer address, then the empty string.
pub fn client_ip(req: &Request<Body>) -> String {
    if let Some(real_ip) = req.headers().get(X_REAL_IP).and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        return match real_ip.parse::<IpAddr>() {
            Ok(ip) => ip.to_string(),
            Err(_) => real_ip.to_string(),
        };
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> axum::http::request::Builder {
        Request::builder().uri("/")
    }

    #[test]
    fn client_ip_prefers_real_ip_header() {
        let mut req = request()
            .header("X-Real-Ip", "10.0.0.1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("192.168.1.1:4000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(&req), "10.0.0.1");
    }

    #[test]
    fn client_ip_normalizes_ipv6() {
        let req = request()
            .header("X-Real-Ip", "2001:DB8:0:0:0:0:0:1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "2001:db8::1");
    }

    #[test]
    fn client_ip_keeps_unparsable_value() {
        let req = request()
            .header("X-Real-Ip", "unknown")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "unknown");
    }

    #[test]
    fn client_ip_falls_back_to_peer() {
        let mut req = request().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&req), "");

        req.extensions_mut()
            .insert(ConnectInfo("192.168.1.1:4000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(&req), "192.168.1.1");
    }

    #[test]
    fn header_and_constant_sources() {
        let req = request()
            .header("X-Api-Key", "abc")
            .body(Body::empty())
            .unwrap();

        let by_header = KeySource::Header(HeaderName::from_static("x-api-key"));
        assert_eq!(by_header.key(&req), "abc");

        let missing = KeySource::Header(HeaderName::from_static("x-other"));
        assert_eq!(missing.key(&req), "");

        assert_eq!(KeySource::Constant("all".into()).key(&req), "all");
        assert_eq!(KeySource::custom(|r| r.uri().path().to_string()).key(&req), "/");
    }
}
