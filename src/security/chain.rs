//! Fixed-order policy evaluation for a matched rule.

use std::sync::Arc;
use std::time::Instant;

use crate::routing::{RouteRequest, Rule};
use crate::security::policy::{DenyReason, PolicyDecision, PolicyKind, PolicyVerdict};
use crate::security::rate_limit::RateLimiter;
use crate::security::tls::{redirect_location, TlsRequirement};

/// TLS → allow-list → rate limit. Stops at the first decision that is not
/// `Allow`; later policies are neither evaluated nor listed.
#[derive(Debug, Clone, Default)]
pub struct PolicyChain {
    limiter: Arc<RateLimiter>,
}

impl PolicyChain {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn evaluate(&self, rule: &Rule, req: &RouteRequest) -> PolicyVerdict {
        self.evaluate_at(rule, req, Instant::now())
    }

    pub fn evaluate_at(&self, rule: &Rule, req: &RouteRequest, now: Instant) -> PolicyVerdict {
        let policy = &rule.policy;
        let mut applied = Vec::new();

        if policy.tls.is_enforced() {
            applied.push(PolicyKind::Tls);
            if !req.is_tls() {
                let redirect = (policy.tls == TlsRequirement::Redirect)
                    .then(|| redirect_location(req.host(), req.path()))
                    .flatten();
                return verdict(PolicyDecision::Deny(DenyReason::TlsRequired { redirect }), applied);
            }
        }

        if !policy.allow_list.is_empty() {
            applied.push(PolicyKind::AllowList);
            if !policy.allow_list.permits(req.source()) {
                return verdict(PolicyDecision::Deny(DenyReason::ForbiddenSource), applied);
            }
        }

        if let Some(limit) = &policy.rate_limit {
            applied.push(PolicyKind::RateLimit);
            if let Err(retry_after) = self.limiter.check(&rule.id, req.source(), limit, now) {
                return verdict(PolicyDecision::RateLimited { retry_after }, applied);
            }
        }

        verdict(PolicyDecision::Allow, applied)
    }
}

fn verdict(decision: PolicyDecision, applied: Vec<PolicyKind>) -> PolicyVerdict {
    PolicyVerdict { decision, applied }
}
