//! Routing decisions for configurations loaded from TOML.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ingress_router::config::parse_config;
use ingress_router::dispatch::DecisionReason;
use ingress_router::load_balancer::{BackendResolver, HealthState};
use ingress_router::routing::BackendRef;
use ingress_router::security::DenyReason;
use ingress_router::{Dispatcher, Outcome, RouteRequest};

const CONFIG: &str = r#"
[[services]]
name = "site"
port = 80
endpoints = ["10.0.0.1:80"]

[[services]]
name = "api"
port = 8080
endpoints = ["10.0.1.1:8080", "10.0.1.2:8080"]

[[services]]
name = "fallback"
port = 80
endpoints = ["10.0.9.9:80"]

[[ingresses]]
name = "site"
default_backend = { service = "fallback", port = 80 }

[[ingresses.rules]]
host = "*.example.com"
paths = [{ path = "/", backend = { service = "site", port = 80 } }]

[[ingresses.rules]]
host = "api.example.com"
paths = [
    { path = "/v1", backend = { service = "api", port = 8080 } },
    { path = "/v1/health", path_type = "Exact", backend = { service = "site", port = 80 } },
    { path = "^/v[0-9]+/users/[0-9]+$", path_type = "regex", backend = { service = "site", port = 80 } },
]

[[ingresses]]
name = "admin"
policy = { tls = "required", allow_list = ["10.0.0.0/8", "2001:db8::/32"] }

[[ingresses.rules]]
host = "admin.example.com"
paths = [{ path = "/", backend = { service = "site", port = 80 } }]

[[ingresses]]
name = "public-api"
policy = { rate_limit = { requests_per_second = 1, burst = 2, per_client = true } }

[[ingresses.rules]]
host = "public.example.com"
paths = [{ path = "/", backend = { service = "api", port = 8080 } }]
"#;

fn dispatcher() -> Dispatcher {
    let dispatcher = Dispatcher::new(Arc::new(BackendResolver::new()));
    dispatcher.apply_config(&parse_config(CONFIG).unwrap()).unwrap();
    dispatcher
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn backend_of(dispatcher: &Dispatcher, request: &RouteRequest) -> String {
    let result = dispatcher.dispatch(request);
    result.rule.expect("no rule matched").backend.service.clone()
}

#[test]
fn test_exact_host_beats_wildcard() {
    let d = dispatcher();

    assert_eq!(backend_of(&d, &RouteRequest::new("api.example.com", "/v1/items")), "api");
    assert_eq!(backend_of(&d, &RouteRequest::new("www.example.com", "/v1/items")), "site");
    // Exact host without a matching path falls back to the wildcard tier.
    assert_eq!(backend_of(&d, &RouteRequest::new("api.example.com", "/docs")), "site");
    // The apex is not covered by the wildcard.
    assert_eq!(backend_of(&d, &RouteRequest::new("example.com", "/")), "fallback");
}

#[test]
fn test_path_kinds() {
    let d = dispatcher();

    assert_eq!(backend_of(&d, &RouteRequest::new("api.example.com", "/v1/health")), "site");
    assert_eq!(backend_of(&d, &RouteRequest::new("api.example.com", "/v1/health/deep")), "api");
    assert_eq!(backend_of(&d, &RouteRequest::new("api.example.com", "/v2/users/42")), "site");
    assert_eq!(backend_of(&d, &RouteRequest::new("API.Example.com:443", "/v1")), "api");
}

#[test]
fn test_default_backend_catches_unknown_hosts() {
    let d = dispatcher();
    let result = d.dispatch(&RouteRequest::new("other.test", "/anything"));

    assert_eq!(result.reason(), DecisionReason::Forwarded);
    assert_eq!(result.endpoint(), Some("10.0.9.9:80".parse().unwrap()));
}

#[test]
fn test_tls_and_allow_list() {
    let d = dispatcher();
    let base = RouteRequest::new("admin.example.com", "/");

    let plaintext = d.dispatch(&base.clone().with_source(ip("10.1.1.1")));
    assert_eq!(plaintext.outcome, Outcome::Denied(DenyReason::TlsRequired { redirect: None }));

    let outsider = d.dispatch(&base.clone().with_tls(true).with_source(ip("192.0.2.1")));
    assert_eq!(outsider.outcome, Outcome::Denied(DenyReason::ForbiddenSource));

    for source in ["10.1.1.1", "2001:db8::1", "::ffff:10.2.3.4"] {
        let result = d.dispatch(&base.clone().with_tls(true).with_source(ip(source)));
        assert_eq!(result.reason(), DecisionReason::Forwarded, "source {source}");
    }
}

#[test]
fn test_per_client_rate_limit() {
    let d = dispatcher();
    let now = Instant::now();
    let from = |source: &str| RouteRequest::new("public.example.com", "/").with_source(ip(source));

    assert_eq!(d.dispatch_at(&from("198.51.100.1"), now).reason(), DecisionReason::Forwarded);
    assert_eq!(d.dispatch_at(&from("198.51.100.1"), now).reason(), DecisionReason::Forwarded);

    match d.dispatch_at(&from("198.51.100.1"), now).outcome {
        Outcome::RateLimited { retry_after } => {
            assert!(retry_after > Duration::ZERO && retry_after <= Duration::from_secs(1));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }

    // Other clients have their own bucket.
    assert_eq!(d.dispatch_at(&from("198.51.100.2"), now).reason(), DecisionReason::Forwarded);

    // One token refills per second.
    let later = now + Duration::from_secs(1);
    assert_eq!(d.dispatch_at(&from("198.51.100.1"), later).reason(), DecisionReason::Forwarded);
}

#[test]
fn test_only_healthy_endpoints_are_selected() {
    let d = dispatcher();
    let api = BackendRef::new("api", 8080);
    let request = RouteRequest::new("api.example.com", "/v1");

    assert!(d.resolver().set_health(&api, "10.0.1.1:8080".parse().unwrap(), HealthState::Unhealthy));
    for _ in 0..4 {
        assert_eq!(d.dispatch(&request).endpoint(), Some("10.0.1.2:8080".parse().unwrap()));
    }

    d.resolver().set_health(&api, "10.0.1.2:8080".parse().unwrap(), HealthState::Unhealthy);
    let result = d.dispatch(&request);
    assert_eq!(result.outcome, Outcome::NoHealthyBackend);
    assert_eq!(result.rule.unwrap().backend, api);
}

#[test]
fn test_round_robin_across_endpoints() {
    let d = dispatcher();
    let request = RouteRequest::new("api.example.com", "/v1");

    let picks: Vec<_> = (0..4).filter_map(|_| d.dispatch(&request).endpoint()).collect();
    assert_eq!(picks.len(), 4);
    assert_ne!(picks[0], picks[1]);
    assert_eq!(picks[0], picks[2]);
    assert_eq!(picks[1], picks[3]);
}
