//! The routing view of an incoming request.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::net::{IpAddr, Ipv4Addr};

/// Everything the routing core needs to know about a request.
///
/// The host is normalized on construction: lowercased, port and trailing dot
/// stripped.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    host: String,
    path: String,
    headers: HeaderMap,
    source: IpAddr,
    tls: bool,
}

impl RouteRequest {
    pub fn new(host: impl AsRef<str>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            host: normalize_host(host.as_ref()),
            path: if path.is_empty() { "/".to_string() } else { path },
            headers: HeaderMap::new(),
            source: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            tls: false,
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_source(mut self, source: IpAddr) -> Self {
        self.source = source;
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn source(&self) -> IpAddr {
        self.source
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }
}

/// Lowercase a Host header value and strip its port.
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    let without_port = if raw.starts_with('[') {
        // IPv6 literal: keep the brackets, drop anything after them
        match raw.find(']') {
            Some(end) => &raw[..=end],
            None => raw,
        }
    } else {
        match raw.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => raw,
        }
    };
    without_port.trim_end_matches('.').to_ascii_lowercase()
}
