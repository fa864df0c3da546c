//! Immutable, validated rule sets.
//!
//! # Responsibilities
//! - Validate a candidate rule list as a whole
//! - Index rules by host tier (exact, wildcard suffix, catch-all)
//! - Select the single best rule for a request
//!
//! # Design Decisions
//! - Every bucket is pre-sorted by `Precedence`, so the first full match wins
//! - Host tiers fall through: a tier with no full match defers to the next one
//! - Matching is a pure function of (snapshot, request)

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::routing::error::{RuleSetRejected, ValidationError};
use crate::routing::matcher::{HostMatch, Matcher};
use crate::routing::request::RouteRequest;
use crate::routing::rule::{BackendRef, Rule, RuleId};

/// Rule set version. `0` is the empty set a store starts with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub const INITIAL: Version = Version(0);

    pub fn new(version: u64) -> Self {
        Self(version)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Knows which backend references can be resolved.
pub trait BackendCatalog: Send + Sync {
    fn contains(&self, backend: &BackendRef) -> bool;
}

impl BackendCatalog for HashSet<BackendRef> {
    fn contains(&self, backend: &BackendRef) -> bool {
        HashSet::contains(self, backend)
    }
}

/// A validated, versioned, host-indexed rule set.
#[derive(Debug)]
pub struct RuleSet {
    version: Version,
    /// All rules in global precedence order.
    rules: Vec<Arc<Rule>>,
    exact: HashMap<String, Vec<Arc<Rule>>>,
    /// Ordered by suffix length, longest first.
    wildcard: Vec<(String, Vec<Arc<Rule>>)>,
    catch_all: Vec<Arc<Rule>>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self {
            version: Version::INITIAL,
            rules: Vec::new(),
            exact: HashMap::new(),
            wildcard: Vec::new(),
            catch_all: Vec::new(),
        }
    }

    /// Validate and index `rules`. Either every rule is accepted or the whole
    /// set is rejected with all errors found.
    pub fn build(
        rules: Vec<Rule>,
        version: Version,
        catalog: &dyn BackendCatalog,
    ) -> Result<Self, RuleSetRejected> {
        let errors = validate(&rules, catalog);
        if !errors.is_empty() {
            return Err(RuleSetRejected::new(errors));
        }

        let mut rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
        rules.sort_by(|a, b| a.precedence().cmp(&b.precedence()));

        let mut exact: HashMap<String, Vec<Arc<Rule>>> = HashMap::new();
        let mut wildcard: HashMap<String, Vec<Arc<Rule>>> = HashMap::new();
        let mut catch_all = Vec::new();

        // Buckets inherit the global precedence order.
        for rule in &rules {
            match &rule.host {
                HostMatch::Exact(host) => exact.entry(host.clone()).or_default().push(rule.clone()),
                HostMatch::Wildcard { suffix } => {
                    wildcard.entry(suffix.clone()).or_default().push(rule.clone())
                }
                HostMatch::Any => catch_all.push(rule.clone()),
            }
        }

        let mut wildcard: Vec<(String, Vec<Arc<Rule>>)> = wildcard.into_iter().collect();
        wildcard.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Ok(Self {
            version,
            rules,
            exact,
            wildcard,
            catch_all,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All rules, in precedence order.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn get(&self, id: &RuleId) -> Option<&Arc<Rule>> {
        self.rules.iter().find(|r| &r.id == id)
    }

    pub fn rule_ids(&self) -> HashSet<RuleId> {
        self.rules.iter().map(|r| r.id.clone()).collect()
    }

    /// Select the best-matching rule for `req`, or `None`.
    pub fn match_request<'a>(&'a self, req: &'a RouteRequest) -> Option<&'a Arc<Rule>> {
        self.tiers(req.host())
            .flat_map(|tier| tier.iter())
            .find(|rule| rule.matches(req))
    }

    /// Candidate buckets in the order they are consulted:
    /// exact host, matching wildcards (longest suffix first), catch-all.
    fn tiers<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a [Arc<Rule>]> + 'a {
        let exact = self.exact.get(host).map(Vec::as_slice).into_iter();
        let wildcard = self
            .wildcard
            .iter()
            .filter(move |(suffix, _)| host.len() > suffix.len() && host.ends_with(suffix.as_str()))
            .map(|(_, rules)| rules.as_slice());
        exact
            .chain(wildcard)
            .chain(std::iter::once(self.catch_all.as_slice()))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

fn validate(rules: &[Rule], catalog: &dyn BackendCatalog) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut ids = HashSet::new();
    let mut keys: HashMap<String, &RuleId> = HashMap::new();

    for rule in rules {
        if !ids.insert(&rule.id) {
            errors.push(ValidationError::DuplicateId { id: rule.id.clone() });
            continue;
        }

        if let Some(first) = keys.insert(rule.conflict_key(), &rule.id) {
            errors.push(ValidationError::DuplicateRule {
                first: first.clone(),
                second: rule.id.clone(),
            });
        }

        if !catalog.contains(&rule.backend) {
            errors.push(ValidationError::UnknownBackend {
                rule: rule.id.clone(),
                backend: rule.backend.clone(),
            });
        }

        if let Some(limit) = &rule.policy.rate_limit {
            if let Err(reason) = limit.validate() {
                errors.push(ValidationError::InvalidRateLimit {
                    rule: rule.id.clone(),
                    reason,
                });
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::matcher::{HeaderMatch, PathMatch};
    use crate::security::{PolicyConfig, RateLimitPolicy};

    fn catalog() -> HashSet<BackendRef> {
        ["svc-a", "svc-b", "svc-c", "svc-d"]
            .into_iter()
            .map(|s| BackendRef::new(s, 80))
            .collect()
    }

    fn rule(id: &str, host: &str, path: PathMatch, backend: &str) -> Rule {
        Rule::new(id, HostMatch::parse(host).unwrap(), path, BackendRef::new(backend, 80))
    }

    fn build(rules: Vec<Rule>) -> RuleSet {
        RuleSet::build(rules, Version::new(1), &catalog()).unwrap()
    }

    fn backend_for(set: &RuleSet, req: &RouteRequest) -> Option<String> {
        set.match_request(req).map(|r| r.backend.service.clone())
    }

    #[test]
    fn test_prefix_example() {
        let set = build(vec![rule("r1", "foo.example.com", PathMatch::prefix("/bar").unwrap(), "svc-a")]);

        let hit = RouteRequest::new("foo.example.com", "/bar/x");
        assert_eq!(backend_for(&set, &hit).as_deref(), Some("svc-a"));

        let miss = RouteRequest::new("foo.example.com", "/other");
        assert_eq!(backend_for(&set, &miss), None);
    }

    #[test]
    fn test_header_variants_route_separately() {
        let set = build(vec![
            rule("bar", "foo.example.com", PathMatch::prefix("/").unwrap(), "svc-b")
                .with_header(HeaderMatch::exact("testheader", "bar").unwrap()),
            rule("foo", "foo.example.com", PathMatch::prefix("/").unwrap(), "svc-a")
                .with_header(HeaderMatch::exact("testheader", "foo").unwrap()),
        ]);

        let req = RouteRequest::new("foo.example.com", "/").with_header("testheader", "foo");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-a"));

        let req = RouteRequest::new("foo.example.com", "/").with_header("testheader", "bar");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-b"));

        let req = RouteRequest::new("foo.example.com", "/");
        assert_eq!(backend_for(&set, &req), None);
    }

    #[test]
    fn test_header_rule_preferred_over_plain() {
        let set = build(vec![
            rule("a-plain", "foo.example.com", PathMatch::prefix("/").unwrap(), "svc-a"),
            rule("z-tagged", "foo.example.com", PathMatch::prefix("/").unwrap(), "svc-b")
                .with_header(HeaderMatch::exact("x-canary", "true").unwrap()),
        ]);

        let tagged = RouteRequest::new("foo.example.com", "/").with_header("x-canary", "true");
        assert_eq!(backend_for(&set, &tagged).as_deref(), Some("svc-b"));

        let plain = RouteRequest::new("foo.example.com", "/");
        assert_eq!(backend_for(&set, &plain).as_deref(), Some("svc-a"));
    }

    #[test]
    fn test_exact_outranks_wildcard_and_prefix_in_any_order() {
        let rules = vec![
            rule("exact", "foo.example.com", PathMatch::exact("/bar").unwrap(), "svc-a"),
            rule("prefix", "foo.example.com", PathMatch::prefix("/bar").unwrap(), "svc-b"),
            rule("wild", "*.example.com", PathMatch::exact("/bar").unwrap(), "svc-c"),
            rule("any", "", PathMatch::exact("/bar").unwrap(), "svc-d"),
        ];
        let req = RouteRequest::new("foo.example.com", "/bar");

        // Every rotation and its reverse.
        for shift in 0..rules.len() {
            let mut rotated = rules.clone();
            rotated.rotate_left(shift);
            assert_eq!(backend_for(&build(rotated.clone()), &req).as_deref(), Some("svc-a"));
            rotated.reverse();
            assert_eq!(backend_for(&build(rotated), &req).as_deref(), Some("svc-a"));
        }
    }

    #[test]
    fn test_longest_wildcard_suffix_wins() {
        let set = build(vec![
            rule("short", "*.example.com", PathMatch::prefix("/").unwrap(), "svc-a"),
            rule("long", "*.api.example.com", PathMatch::prefix("/").unwrap(), "svc-b"),
        ]);

        let req = RouteRequest::new("v1.api.example.com", "/");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-b"));

        let req = RouteRequest::new("www.example.com", "/");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-a"));
    }

    #[test]
    fn test_tiers_fall_through() {
        let set = build(vec![
            rule("exact", "foo.example.com", PathMatch::prefix("/admin").unwrap(), "svc-a"),
            rule("wild", "*.example.com", PathMatch::prefix("/static").unwrap(), "svc-b"),
            rule("default", "", PathMatch::prefix("/").unwrap(), "svc-c"),
        ]);

        let req = RouteRequest::new("foo.example.com", "/admin/users");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-a"));

        let req = RouteRequest::new("foo.example.com", "/static/app.js");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-b"));

        let req = RouteRequest::new("foo.example.com", "/elsewhere");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-c"));

        let req = RouteRequest::new("unknown.org", "/");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-c"));
    }

    #[test]
    fn test_longer_prefix_wins_regardless_of_order() {
        let set = build(vec![
            rule("a", "foo.example.com", PathMatch::prefix("/").unwrap(), "svc-a"),
            rule("b", "foo.example.com", PathMatch::prefix("/api/v1").unwrap(), "svc-c"),
            rule("c", "foo.example.com", PathMatch::prefix("/api").unwrap(), "svc-b"),
        ]);

        let req = RouteRequest::new("foo.example.com", "/api/v1/users");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-c"));
        let req = RouteRequest::new("foo.example.com", "/api/v2");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-b"));
    }

    #[test]
    fn test_equal_specificity_breaks_on_lowest_id() {
        let set = build(vec![
            rule("rule-b", "foo.example.com", PathMatch::prefix("/api").unwrap(), "svc-b")
                .with_header(HeaderMatch::exact("x-b", "1").unwrap()),
            rule("rule-a", "foo.example.com", PathMatch::prefix("/api").unwrap(), "svc-a")
                .with_header(HeaderMatch::exact("x-a", "1").unwrap()),
        ]);

        let req = RouteRequest::new("foo.example.com", "/api")
            .with_header("x-a", "1")
            .with_header("x-b", "1");
        assert_eq!(backend_for(&set, &req).as_deref(), Some("svc-a"));
    }

    #[test]
    fn test_match_is_pure() {
        let set = build(vec![
            rule("a", "foo.example.com", PathMatch::prefix("/").unwrap(), "svc-a"),
            rule("b", "*.example.com", PathMatch::regex("^/v[0-9]+").unwrap(), "svc-b"),
        ]);
        let req = RouteRequest::new("bar.example.com", "/v2/items");

        let first = set.match_request(&req).map(|r| r.id.clone());
        let second = set.match_request(&req).map(|r| r.id.clone());
        assert_eq!(first, second);
        assert_eq!(first, Some(RuleId::new("b")));
    }

    #[test]
    fn test_rejects_whole_set() {
        let result = RuleSet::build(
            vec![
                rule("ok", "foo.example.com", PathMatch::prefix("/").unwrap(), "svc-a"),
                rule("dup", "foo.example.com", PathMatch::prefix("/").unwrap(), "svc-b"),
                rule("missing", "foo.example.com", PathMatch::prefix("/x").unwrap(), "nope"),
                rule("ok", "bar.example.com", PathMatch::prefix("/").unwrap(), "svc-a"),
            ],
            Version::new(1),
            &catalog(),
        );

        let errors = result.unwrap_err().into_errors();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::DuplicateRule {
            first: RuleId::new("ok"),
            second: RuleId::new("dup"),
        }));
        assert!(errors.contains(&ValidationError::UnknownBackend {
            rule: RuleId::new("missing"),
            backend: BackendRef::new("nope", 80),
        }));
        assert!(errors.contains(&ValidationError::DuplicateId { id: RuleId::new("ok") }));
    }

    #[test]
    fn test_rejects_zero_rate_limit() {
        let policy = PolicyConfig {
            rate_limit: Some(RateLimitPolicy::new(0)),
            ..PolicyConfig::default()
        };
        let result = RuleSet::build(
            vec![rule("r", "", PathMatch::prefix("/").unwrap(), "svc-a").with_policy(policy)],
            Version::new(1),
            &catalog(),
        );
        assert!(matches!(
            result.unwrap_err().errors(),
            [ValidationError::InvalidRateLimit { .. }]
        ));
    }

    #[test]
    fn test_rules_are_listed_in_precedence_order() {
        let set = build(vec![
            rule("c", "", PathMatch::prefix("/").unwrap(), "svc-a"),
            rule("a", "", PathMatch::exact("/x").unwrap(), "svc-a"),
            rule("b", "", PathMatch::prefix("/long/path").unwrap(), "svc-a"),
        ]);
        let ids: Vec<&str> = set.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
