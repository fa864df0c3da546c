//! Response handling and transformation.
//!
//! # Responsibilities
//! - Map routing outcomes to HTTP responses
//! - Strip hop-by-hop headers from upstream responses
//!
//! # Design Decisions
//! - Upstream bodies are streamed, never buffered
//! - Upstream connection failures map to 502 Bad Gateway

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::time::Duration;

use crate::dispatch::Outcome;
use crate::http::request::strip_hop_by_hop;
use crate::security::DenyReason;

/// Response for every outcome except `Forward`, which returns `None`.
///
/// `query` is appended to TLS redirect locations.
pub fn outcome_response(outcome: &Outcome, query: Option<&str>) -> Option<Response> {
    let response = match outcome {
        Outcome::Forward(_) => return None,
        Outcome::NoRoute => (StatusCode::NOT_FOUND, "No matching route found").into_response(),
        Outcome::Denied(DenyReason::TlsRequired { redirect: Some(location) }) => {
            let location = match query {
                Some(q) if !q.is_empty() => format!("{location}?{q}"),
                _ => location.clone(),
            };
            match HeaderValue::from_str(&location) {
                Ok(value) => (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, value)]).into_response(),
                Err(_) => (StatusCode::FORBIDDEN, "TLS required").into_response(),
            }
        }
        Outcome::Denied(DenyReason::TlsRequired { redirect: None }) => {
            (StatusCode::FORBIDDEN, "TLS required").into_response()
        }
        Outcome::Denied(DenyReason::ForbiddenSource) => {
            (StatusCode::FORBIDDEN, "Source address not allowed").into_response()
        }
        Outcome::RateLimited { retry_after } => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after_secs(*retry_after).to_string())],
            "Rate limit exceeded",
        )
            .into_response(),
        Outcome::NoHealthyBackend => {
            (StatusCode::SERVICE_UNAVAILABLE, "No healthy backends").into_response()
        }
    };
    Some(response)
}

/// Whole seconds, rounded up, at least 1.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Pass an upstream response back to the client.
pub fn from_upstream(response: hyper::Response<hyper::body::Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

pub fn bad_gateway() -> Response {
    (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
}
