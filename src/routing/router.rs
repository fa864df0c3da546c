//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Load the current snapshot for each request
//! - Look up the matching rule
//! - Return matched rule or explicit no-match, tagged with the snapshot version
//!
//! # Design Decisions
//! - One snapshot per request: every step of a request sees the same rules
//! - O(1) exact host lookup via HashMap
//! - O(n) scan within a host bucket (acceptable for typical rule counts)

use std::sync::Arc;

use crate::routing::request::RouteRequest;
use crate::routing::rule::Rule;
use crate::routing::snapshot::Version;
use crate::routing::store::RuleStore;

/// Result of a rule lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub version: Version,
    pub rule: Option<Arc<Rule>>,
}

/// Read side of the rule store.
#[derive(Debug, Clone)]
pub struct Router {
    store: Arc<RuleStore>,
}

impl Router {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    pub fn match_request(&self, req: &RouteRequest) -> RouteMatch {
        let snapshot = self.store.current_snapshot();
        let rule = snapshot.match_request(req).cloned();

        match &rule {
            Some(rule) => tracing::trace!(
                host = %req.host(),
                path = %req.path(),
                rule = %rule.id,
                version = %snapshot.version(),
                "Route matched"
            ),
            None => tracing::trace!(
                host = %req.host(),
                path = %req.path(),
                version = %snapshot.version(),
                "No route matched"
            ),
        }

        RouteMatch {
            version: snapshot.version(),
            rule,
        }
    }
}
