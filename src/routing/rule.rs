//! Routing rules and their precedence.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::routing::matcher::{HeaderMatch, HostMatch, Matcher, PathMatch, PathSpecificity};
use crate::routing::request::RouteRequest;
use crate::security::PolicyConfig;

/// Stable rule identifier. The final tie-breaker between equally specific rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Reference to a backend service port, optionally narrowed to a named
/// endpoint set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackendRef {
    pub service: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_set: Option<String>,
}

impl BackendRef {
    pub fn new(service: impl Into<String>, port: u16) -> Self {
        Self {
            service: service.into(),
            port,
            endpoint_set: None,
        }
    }

    pub fn with_endpoint_set(mut self, set: impl Into<String>) -> Self {
        self.endpoint_set = Some(set.into());
        self
    }
}

impl fmt::Display for BackendRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.port)?;
        if let Some(set) = &self.endpoint_set {
            write!(f, "/{set}")?;
        }
        Ok(())
    }
}

/// A single routing rule: host + path + header predicates → backend, with the
/// policies to enforce on matched requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: RuleId,
    pub host: HostMatch,
    pub path: PathMatch,
    pub headers: Vec<HeaderMatch>,
    pub backend: BackendRef,
    pub policy: PolicyConfig,
}

impl Rule {
    pub fn new(id: impl Into<RuleId>, host: HostMatch, path: PathMatch, backend: BackendRef) -> Self {
        Self {
            id: id.into(),
            host,
            path,
            headers: Vec::new(),
            backend,
            policy: PolicyConfig::default(),
        }
    }

    pub fn with_header(mut self, header: HeaderMatch) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn precedence(&self) -> Precedence<'_> {
        Precedence {
            path: self.path.specificity(),
            has_headers: !self.headers.is_empty(),
            predicates: self.headers.len(),
            id: &self.id,
        }
    }

    /// Two rules with the same key can never be told apart by a request.
    pub fn conflict_key(&self) -> String {
        conflict_key(&self.host, &self.path, &self.headers)
    }
}

impl From<String> for RuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Matcher for Rule {
    fn matches(&self, req: &RouteRequest) -> bool {
        self.host.matches(req)
            && self.path.matches(req)
            && self.headers.iter().all(|h| h.matches(req))
    }
}

/// Canonical `host:kind:path[headers]` rendering of a rule's match conditions.
/// Header predicates are sorted, so declaration order does not matter.
pub fn conflict_key(host: &HostMatch, path: &PathMatch, headers: &[HeaderMatch]) -> String {
    let mut key = format!("{}:{}:{}", host, path.kind(), path.pattern());
    if !headers.is_empty() {
        let mut rendered: Vec<String> = headers.iter().map(ToString::to_string).collect();
        rendered.sort();
        key.push('[');
        key.push_str(&rendered.join(","));
        key.push(']');
    }
    key
}

/// Sort key for rules that share a host tier. `Less` means higher priority.
///
/// Applied in sequence: most specific path, header predicates over none,
/// fewest predicates, lowest rule id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precedence<'a> {
    pub path: PathSpecificity,
    pub has_headers: bool,
    pub predicates: usize,
    pub id: &'a RuleId,
}

impl Ord for Precedence<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .path
            .cmp(&self.path)
            .then_with(|| other.has_headers.cmp(&self.has_headers))
            .then_with(|| self.predicates.cmp(&other.predicates))
            .then_with(|| self.id.cmp(other.id))
    }
}

impl PartialOrd for Precedence<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
