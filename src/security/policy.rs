//! Typed per-rule policy configuration and decisions.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::security::access_control::AllowList;
use crate::security::rate_limit::RateLimitPolicy;
use crate::security::tls::TlsRequirement;

/// Policies attached to a rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyConfig {
    pub tls: TlsRequirement,
    pub allow_list: AllowList,
    pub rate_limit: Option<RateLimitPolicy>,
}

impl PolicyConfig {
    /// Policies that will be evaluated for this rule, in chain order.
    pub fn enforced(&self) -> Vec<PolicyKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.tls.is_enforced() {
            kinds.push(PolicyKind::Tls);
        }
        if !self.allow_list.is_empty() {
            kinds.push(PolicyKind::AllowList);
        }
        if self.rate_limit.is_some() {
            kinds.push(PolicyKind::RateLimit);
        }
        kinds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Tls,
    AllowList,
    RateLimit,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Tls => "tls",
            PolicyKind::AllowList => "allow_list",
            PolicyKind::RateLimit => "rate_limit",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Plaintext request on a rule that requires TLS. `redirect` holds the
    /// https location when the rule redirects instead of refusing.
    TlsRequired { redirect: Option<String> },
    /// Source address outside the allow-list.
    ForbiddenSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(DenyReason),
    RateLimited { retry_after: Duration },
}

impl PolicyDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }
}

/// Decision plus the policies evaluated to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVerdict {
    pub decision: PolicyDecision,
    pub applied: Vec<PolicyKind>,
}
