//! Outbound request rewriting.
//!
//! # Responsibilities
//! - Join the configured path prefix with the request path
//! - Merge the prefix query with the request query
//! - Default an absent `User-Agent` to empty, optionally override `Host`
//! - Strip hop-by-hop headers, keeping the upgrade handshake intact
//! - Append the client address to `X-Forwarded-For`

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri, Version};

use crate::upstream::UpstreamError;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers meaningful only for a single connection.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

/// How requests are rewritten before forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    prefix: String,
    query: String,
    host: Option<HeaderValue>,
}

impl Default for Rewrite {
    fn default() -> Self {
        Self {
            prefix: "/".into(),
            query: String::new(),
            host: None,
        }
    }
}

impl Rewrite {
    /// Set the target prefix, e.g. `/api` or `/api?key=1`. Empty means `/`.
    pub fn with_path(mut self, path: &str) -> Self {
        let (prefix, query) = path.split_once('?').unwrap_or((path, ""));
        self.prefix = if prefix.is_empty() { "/".into() } else { prefix.into() };
        self.query = query.into();
        self
    }

    /// Send `host` as the `Host` header instead of the inbound one.
    pub fn with_host(mut self, host: &str) -> Result<Self, UpstreamError> {
        let value = HeaderValue::from_str(host)
            .map_err(|e| UpstreamError::InvalidRequest(format!("host override {host:?}: {e}")))?;
        self.host = Some(value);
        Ok(self)
    }

    pub fn apply<B>(&self, request: &mut Request<B>) -> Result<(), UpstreamError> {
        self.rewrite_uri(request)?;

        let upgrade = request.headers().get(header::UPGRADE).cloned();
        remove_hop_by_hop(request.headers_mut());
        if let Some(protocol) = upgrade {
            let headers = request.headers_mut();
            headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(header::UPGRADE, protocol);
        }

        if !request.headers().contains_key(header::USER_AGENT) {
            request
                .headers_mut()
                .insert(header::USER_AGENT, HeaderValue::from_static(""));
        }

        let host = match &self.host {
            Some(host) => Some(host.clone()),
            None if !request.headers().contains_key(header::HOST) => request
                .uri()
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok()),
            None => None,
        };
        if let Some(host) = host {
            request.headers_mut().insert(header::HOST, host);
        }

        append_forwarded_for(request);
        *request.version_mut() = Version::HTTP_11;
        Ok(())
    }

    fn rewrite_uri<B>(&self, request: &mut Request<B>) -> Result<(), UpstreamError> {
        let path = single_joining_slash(&self.prefix, request.uri().path());
        let query = merge_query(&self.query, request.uri().query().unwrap_or(""));
        let path_and_query = if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        };
        let path_and_query = PathAndQuery::try_from(path_and_query)
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

        let mut parts = std::mem::take(request.uri_mut()).into_parts();
        parts.path_and_query = Some(path_and_query);
        *request.uri_mut() =
            Uri::from_parts(parts).map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        Ok(())
    }
}

/// Join two path segments with exactly one slash between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

fn merge_query(prefix: &str, query: &str) -> String {
    if prefix.is_empty() || query.is_empty() {
        format!("{prefix}{query}")
    } else {
        format!("{prefix}&{query}")
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn remove_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

fn append_forwarded_for<B>(request: &mut Request<B>) {
    let Some(peer) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
    else {
        return;
    };
    let ip = peer.ip().to_string();
    let value = match request
        .headers()
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
    {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        request.headers_mut().insert(X_FORWARDED_FOR, value);
    }
}
