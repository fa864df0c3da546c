//! Request dispatch: the routing core's single entry point.
//!
//! # Responsibilities
//! - Match a request against the current rule set snapshot
//! - Run the matched rule's policy chain
//! - Resolve the rule's backend to an endpoint
//! - Apply configuration: services into the resolver, ingresses into the store
//!
//! # Design Decisions
//! - Every request works against one snapshot, start to finish
//! - Outcomes are values, never errors
//! - Every decision is counted by reason and logged at debug level

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::schema::IngressConfig;
use crate::config::validation::validate_config;
use crate::config::ConfigError;
use crate::load_balancer::{BackendResolver, Endpoint, HealthState};
use crate::observability::metrics;
use crate::routing::compile::compile_ingresses;
use crate::routing::{
    BackendCatalog, BackendRef, RouteMatch, RouteRequest, Router, Rule, RuleSetRejected, RuleStore, Version,
};
use crate::security::{DenyReason, PolicyChain, PolicyDecision, PolicyKind, RateLimiter};

/// What to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Forward(Endpoint),
    NoRoute,
    Denied(DenyReason),
    RateLimited { retry_after: Duration },
    NoHealthyBackend,
}

/// Low-cardinality label for an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    Forwarded,
    NoRoute,
    TlsRequired,
    TlsRedirect,
    ForbiddenSource,
    RateLimited,
    NoHealthyBackend,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::Forwarded => "forwarded",
            DecisionReason::NoRoute => "no_route",
            DecisionReason::TlsRequired => "tls_required",
            DecisionReason::TlsRedirect => "tls_redirect",
            DecisionReason::ForbiddenSource => "forbidden_source",
            DecisionReason::RateLimited => "rate_limited",
            DecisionReason::NoHealthyBackend => "no_healthy_backend",
        }
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full decision for one request.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Version of the snapshot the decision was made against.
    pub version: Version,
    pub rule: Option<Arc<Rule>>,
    /// Policies evaluated, in order.
    pub policies: Vec<PolicyKind>,
    pub outcome: Outcome,
}

impl MatchResult {
    pub fn reason(&self) -> DecisionReason {
        match &self.outcome {
            Outcome::Forward(_) => DecisionReason::Forwarded,
            Outcome::NoRoute => DecisionReason::NoRoute,
            Outcome::Denied(DenyReason::TlsRequired { redirect: Some(_) }) => DecisionReason::TlsRedirect,
            Outcome::Denied(DenyReason::TlsRequired { redirect: None }) => DecisionReason::TlsRequired,
            Outcome::Denied(DenyReason::ForbiddenSource) => DecisionReason::ForbiddenSource,
            Outcome::RateLimited { .. } => DecisionReason::RateLimited,
            Outcome::NoHealthyBackend => DecisionReason::NoHealthyBackend,
        }
    }

    pub fn endpoint(&self) -> Option<SocketAddr> {
        match &self.outcome {
            Outcome::Forward(endpoint) => Some(endpoint.address),
            _ => None,
        }
    }
}

/// Rule store, policy chain and backend resolver wired together.
#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<RuleStore>,
    router: Router,
    resolver: Arc<BackendResolver>,
    policies: PolicyChain,
    /// Backends declared by the configuration file, as opposed to ones fed
    /// through the admin API.
    managed: Mutex<HashSet<BackendRef>>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<BackendResolver>) -> Self {
        let catalog: Arc<dyn BackendCatalog> = resolver.clone();
        let store = Arc::new(RuleStore::new(catalog));
        Self {
            router: Router::new(store.clone()),
            store,
            resolver,
            policies: PolicyChain::new(Arc::new(RateLimiter::new())),
            managed: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<BackendResolver> {
        &self.resolver
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.policies.limiter()
    }

    pub fn dispatch(&self, req: &RouteRequest) -> MatchResult {
        self.dispatch_at(req, Instant::now())
    }

    /// Dispatch with an explicit clock for rate limiting.
    pub fn dispatch_at(&self, req: &RouteRequest, now: Instant) -> MatchResult {
        let RouteMatch { version, rule } = self.router.match_request(req);

        let result = match rule {
            None => MatchResult {
                version,
                rule: None,
                policies: Vec::new(),
                outcome: Outcome::NoRoute,
            },
            Some(rule) => {
                let verdict = self.policies.evaluate_at(&rule, req, now);
                let outcome = match verdict.decision {
                    PolicyDecision::Allow => match self.resolver.resolve(&rule.backend) {
                        Ok(endpoint) => Outcome::Forward(endpoint),
                        Err(_) => Outcome::NoHealthyBackend,
                    },
                    PolicyDecision::Deny(reason) => Outcome::Denied(reason),
                    PolicyDecision::RateLimited { retry_after } => Outcome::RateLimited { retry_after },
                };
                MatchResult {
                    version,
                    rule: Some(rule),
                    policies: verdict.applied,
                    outcome,
                }
            }
        };

        let reason = result.reason();
        metrics::record_decision(reason.as_str());
        tracing::debug!(
            host = %req.host(),
            path = %req.path(),
            rule = result.rule.as_ref().map(|r| r.id.as_str()).unwrap_or("-"),
            version = %version,
            reason = %reason,
            endpoint = ?result.endpoint(),
            "Request dispatched"
        );

        result
    }

    /// Replace the rule set and drop rate-limit state of removed rules.
    pub fn replace_rules(&self, rules: Vec<Rule>) -> Result<Version, RuleSetRejected> {
        let version = self.store.replace(rules)?;
        self.prune_limiter();
        Ok(version)
    }

    /// Apply a whole configuration.
    ///
    /// Services are registered before the rules are validated, so rules may
    /// reference services declared in the same file. If the rules are
    /// rejected, every touched service gets its previous endpoint set back
    /// (or is withdrawn if it is new) and the running rule set stays active.
    pub fn apply_config(&self, config: &IngressConfig) -> Result<Version, ConfigError> {
        validate_config(config).map_err(ConfigError::Invalid)?;
        let rules = compile_ingresses(&config.ingresses)?;

        let initial = if config.health_check.enabled {
            HealthState::Unknown
        } else {
            HealthState::Healthy
        };

        let mut managed = self.managed.lock().unwrap_or_else(PoisonError::into_inner);
        let declared: HashSet<BackendRef> = config.services.iter().map(|s| s.backend_ref()).collect();
        let mut previous: Vec<(BackendRef, Option<Arc<Vec<Endpoint>>>)> = Vec::new();

        for service in &config.services {
            let backend = service.backend_ref();
            previous.push((backend.clone(), self.resolver.endpoints(&backend)));
            let addresses: Vec<SocketAddr> =
                service.endpoints.iter().filter_map(|e| e.parse().ok()).collect();
            self.resolver.sync_addresses(backend, &addresses, initial);
        }

        let stale: HashSet<BackendRef> = managed.difference(&declared).cloned().collect();
        let catalog = PendingCatalog {
            resolver: &self.resolver,
            stale: &stale,
        };

        let version = match self.store.replace_against(rules, &catalog) {
            Ok(version) => version,
            Err(rejected) => {
                for (backend, endpoints) in previous {
                    match endpoints {
                        Some(endpoints) => self.resolver.update(backend, endpoints.to_vec()),
                        None => {
                            self.resolver.remove(&backend);
                        }
                    }
                }
                return Err(rejected.into());
            }
        };

        for backend in &stale {
            self.resolver.remove(backend);
        }
        *managed = declared;
        drop(managed);

        self.prune_limiter();
        tracing::info!(
            version = %version,
            services = config.services.len(),
            ingresses = config.ingresses.len(),
            "Configuration applied"
        );
        Ok(version)
    }

    fn prune_limiter(&self) {
        let live = self.store.current_snapshot().rule_ids();
        self.limiter().retain_rules(&live);
    }
}

/// The resolver's catalog minus backends about to be withdrawn.
struct PendingCatalog<'a> {
    resolver: &'a BackendResolver,
    stale: &'a HashSet<BackendRef>,
}

impl BackendCatalog for PendingCatalog<'_> {
    fn contains(&self, backend: &BackendRef) -> bool {
        !self.stale.contains(backend) && self.resolver.contains(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::routing::{HeaderMatch, HostMatch, PathMatch};
    use crate::security::{PolicyConfig, RateLimitPolicy, TlsRequirement};

    fn addr(port: u16) -> SocketAddr {
        format!("10.0.0.1:{port}").parse().unwrap()
    }

    fn dispatcher() -> Dispatcher {
        let resolver = Arc::new(BackendResolver::new());
        resolver.update(BackendRef::new("svc-a", 80), vec![Endpoint::healthy(addr(1))]);
        resolver.update(BackendRef::new("svc-b", 80), vec![Endpoint::healthy(addr(2))]);
        Dispatcher::new(resolver)
    }

    fn rule(id: &str, host: &str, path: &str, backend: &str) -> Rule {
        Rule::new(
            id,
            HostMatch::parse(host).unwrap(),
            PathMatch::prefix(path).unwrap(),
            BackendRef::new(backend, 80),
        )
    }

    #[test]
    fn test_prefix_route_end_to_end() {
        let d = dispatcher();
        d.replace_rules(vec![rule("r1", "foo.example.com", "/bar", "svc-a")]).unwrap();

        let hit = d.dispatch(&RouteRequest::new("foo.example.com", "/bar/baz"));
        assert_eq!(hit.outcome, Outcome::Forward(Endpoint::healthy(addr(1))));
        assert_eq!(hit.version, Version::new(1));
        assert_eq!(hit.reason(), DecisionReason::Forwarded);

        let miss = d.dispatch(&RouteRequest::new("foo.example.com", "/other"));
        assert_eq!(miss.outcome, Outcome::NoRoute);
        assert!(miss.rule.is_none());
    }

    #[test]
    fn test_header_routing() {
        let d = dispatcher();
        d.replace_rules(vec![
            rule("foo", "foo.example.com", "/", "svc-a")
                .with_header(HeaderMatch::exact("testheader", "foo").unwrap()),
            rule("bar", "foo.example.com", "/", "svc-b")
                .with_header(HeaderMatch::exact("testheader", "bar").unwrap()),
        ])
        .unwrap();

        let req = |value: &str| RouteRequest::new("foo.example.com", "/").with_header("testheader", value);
        assert_eq!(d.dispatch(&req("foo")).endpoint(), Some(addr(1)));
        assert_eq!(d.dispatch(&req("bar")).endpoint(), Some(addr(2)));
        assert_eq!(d.dispatch(&req("baz")).outcome, Outcome::NoRoute);
    }

    #[test]
    fn test_no_healthy_backend() {
        let d = dispatcher();
        d.replace_rules(vec![rule("r1", "foo.example.com", "/", "svc-a")]).unwrap();
        d.resolver().set_health(&BackendRef::new("svc-a", 80), addr(1), HealthState::Unhealthy);

        let result = d.dispatch(&RouteRequest::new("foo.example.com", "/"));
        assert_eq!(result.outcome, Outcome::NoHealthyBackend);
        assert_eq!(result.rule.unwrap().id.as_str(), "r1");
    }

    #[test]
    fn test_policies_reported() {
        let d = dispatcher();
        let policy = PolicyConfig {
            tls: TlsRequirement::Redirect,
            rate_limit: Some(RateLimitPolicy::new(1)),
            ..Default::default()
        };
        d.replace_rules(vec![rule("r1", "foo.example.com", "/", "svc-a").with_policy(policy)])
            .unwrap();

        let plain = d.dispatch(&RouteRequest::new("foo.example.com", "/x"));
        assert_eq!(plain.reason(), DecisionReason::TlsRedirect);
        assert_eq!(plain.policies, vec![PolicyKind::Tls]);

        let now = Instant::now();
        let tls = RouteRequest::new("foo.example.com", "/x").with_tls(true);
        let first = d.dispatch_at(&tls, now);
        assert_eq!(first.reason(), DecisionReason::Forwarded);
        assert_eq!(first.policies, vec![PolicyKind::Tls, PolicyKind::RateLimit]);
        assert_eq!(d.dispatch_at(&tls, now).reason(), DecisionReason::RateLimited);
    }

    #[test]
    fn test_replace_prunes_limiter() {
        let d = dispatcher();
        let policy = PolicyConfig {
            rate_limit: Some(RateLimitPolicy::new(10)),
            ..Default::default()
        };
        d.replace_rules(vec![rule("r1", "foo.example.com", "/", "svc-a").with_policy(policy)])
            .unwrap();
        d.dispatch(&RouteRequest::new("foo.example.com", "/"));
        assert_eq!(d.limiter().len(), 1);

        d.replace_rules(vec![rule("r2", "foo.example.com", "/", "svc-a")]).unwrap();
        assert!(d.limiter().is_empty());
    }

    const CONFIG: &str = r#"
        [[services]]
        name = "svc-a"
        port = 80
        endpoints = ["10.0.0.1:1"]

        [[ingresses]]
        name = "web"

        [[ingresses.rules]]
        host = "foo.example.com"
        paths = [{ path = "/bar", backend = { service = "svc-a", port = 80 } }]
    "#;

    #[test]
    fn test_rejected_config_restores_existing_endpoints() {
        let d = Dispatcher::new(Arc::new(BackendResolver::new()));
        d.apply_config(&parse_config(CONFIG).unwrap()).unwrap();

        let mut bad = parse_config(&CONFIG.replace("10.0.0.1:1", "10.0.0.9:9")).unwrap();
        bad.ingresses[0].rules[0].paths[0].backend.service = "svc-missing".into();
        assert!(d.apply_config(&bad).is_err());

        let request = RouteRequest::new("foo.example.com", "/bar");
        assert_eq!(d.dispatch(&request).endpoint(), Some(addr(1)));
        let endpoints = d.resolver().endpoints(&BackendRef::new("svc-a", 80)).unwrap();
        assert_eq!(endpoints.as_slice(), &[Endpoint::healthy(addr(1))]);
    }

    #[test]
    fn test_apply_config() {
        let d = Dispatcher::new(Arc::new(BackendResolver::new()));
        let version = d.apply_config(&parse_config(CONFIG).unwrap()).unwrap();
        assert_eq!(version, Version::new(1));

        let result = d.dispatch(&RouteRequest::new("foo.example.com", "/bar"));
        assert_eq!(result.endpoint(), Some(addr(1)));
        assert_eq!(
            result.rule.unwrap().id.as_str(),
            "web:foo.example.com:prefix:/bar"
        );
    }

    #[test]
    fn test_rejected_config_keeps_state() {
        let d = Dispatcher::new(Arc::new(BackendResolver::new()));
        d.apply_config(&parse_config(CONFIG).unwrap()).unwrap();

        // Declares svc-new, but one rule points at a service nobody declares.
        let bad = parse_config(
            &CONFIG
                .replace("name = \"svc-a\"", "name = \"svc-new\"")
                .replace("service = \"svc-a\"", "service = \"svc-missing\""),
        )
        .unwrap();
        let err = d.apply_config(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Rules(_)));

        assert_eq!(d.store().version(), Version::new(1));
        assert!(!d.resolver().contains(&BackendRef::new("svc-new", 80)));
        assert_eq!(
            d.dispatch(&RouteRequest::new("foo.example.com", "/bar")).endpoint(),
            Some(addr(1))
        );
    }

    #[test]
    fn test_dropped_service_cannot_be_referenced() {
        let d = Dispatcher::new(Arc::new(BackendResolver::new()));
        d.apply_config(&parse_config(CONFIG).unwrap()).unwrap();

        // svc-a is no longer declared but a rule still points at it.
        let mut config = parse_config(CONFIG).unwrap();
        config.services.clear();
        assert!(d.apply_config(&config).is_err());
        assert!(d.resolver().contains(&BackendRef::new("svc-a", 80)));

        config.ingresses.clear();
        assert_eq!(d.apply_config(&config).unwrap(), Version::new(2));
        assert!(!d.resolver().contains(&BackendRef::new("svc-a", 80)));
    }

    #[test]
    fn test_health_checked_services_start_unknown() {
        let d = Dispatcher::new(Arc::new(BackendResolver::new()));
        let mut config = parse_config(CONFIG).unwrap();
        config.health_check.enabled = true;
        d.apply_config(&config).unwrap();

        let result = d.dispatch(&RouteRequest::new("foo.example.com", "/bar"));
        assert_eq!(result.outcome, Outcome::NoHealthyBackend);
    }
}
