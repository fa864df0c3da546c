//! Compile declarative ingress specs into normalized rules.
//!
//! # Responsibilities
//! - Parse host, path and header patterns
//! - Resolve per-ingress policy (TLS, allow-list, rate limit)
//! - Derive content-based rule ids
//! - Turn `default_backend` into a catch-all rule
//!
//! # Design Decisions
//! - All errors are collected; nothing is returned unless every rule compiles
//! - Rule ids are `{ingress}:{conflict key}` so they do not depend on
//!   declaration order

use crate::config::schema::{HeaderSpec, IngressSpec, PolicySpec};
use crate::routing::error::{RuleSetRejected, ValidationError};
use crate::routing::matcher::{HeaderMatch, HostMatch, PathMatch};
use crate::routing::rule::{conflict_key, Rule, RuleId};
use crate::security::{AllowList, PolicyConfig, TlsRequirement};

/// Compile every ingress into rules, or report every problem found.
pub fn compile_ingresses(ingresses: &[IngressSpec]) -> Result<Vec<Rule>, RuleSetRejected> {
    let mut rules = Vec::new();
    let mut errors = Vec::new();

    for ingress in ingresses {
        compile_ingress(ingress, &mut rules, &mut errors);
    }

    if errors.is_empty() {
        Ok(rules)
    } else {
        Err(RuleSetRejected::new(errors))
    }
}

fn compile_ingress(ingress: &IngressSpec, rules: &mut Vec<Rule>, errors: &mut Vec<ValidationError>) {
    let base = match compile_policy(&ingress.policy) {
        Ok(policy) => policy,
        Err(mut policy_errors) => {
            errors.append(&mut policy_errors);
            return;
        }
    };

    let tls_hosts: Vec<HostMatch> = ingress
        .tls
        .iter()
        .flat_map(|tls| tls.hosts.iter())
        .filter_map(|host| collect(HostMatch::parse(host), errors))
        .collect();

    for rule_spec in &ingress.rules {
        let Some(host) = collect(HostMatch::parse(rule_spec.host.as_deref().unwrap_or("")), errors) else {
            continue;
        };

        let mut policy = base.clone();
        policy.tls = ingress
            .policy
            .tls
            .unwrap_or_else(|| default_tls(&tls_hosts, &host));

        for path_spec in &rule_spec.paths {
            let path = collect(PathMatch::new(path_spec.path_type, &path_spec.path), errors);
            let headers: Vec<Option<HeaderMatch>> = path_spec
                .headers
                .iter()
                .map(|h| collect(compile_header(h), errors))
                .collect();

            let (Some(path), Some(headers)) = (path, headers.into_iter().collect::<Option<Vec<_>>>()) else {
                continue;
            };

            let id = rule_id(&ingress.name, &host, &path, &headers);
            let mut rule = Rule::new(id, host.clone(), path, path_spec.backend.clone())
                .with_policy(policy.clone());
            rule.headers = headers;
            rules.push(rule);
        }
    }

    if let Some(backend) = &ingress.default_backend {
        let path = PathMatch::Prefix("/".to_string());
        let mut policy = base;
        policy.tls = ingress.policy.tls.unwrap_or_default();
        let id = rule_id(&ingress.name, &HostMatch::Any, &path, &[]);
        rules.push(Rule::new(id, HostMatch::Any, path, backend.clone()).with_policy(policy));
    }
}

fn compile_policy(spec: &PolicySpec) -> Result<PolicyConfig, Vec<ValidationError>> {
    let allow_list = AllowList::parse(&spec.allow_list)?;
    Ok(PolicyConfig {
        tls: spec.tls.unwrap_or_default(),
        allow_list,
        rate_limit: spec.rate_limit,
    })
}

fn compile_header(spec: &HeaderSpec) -> Result<HeaderMatch, ValidationError> {
    match (&spec.value, &spec.regex) {
        (Some(value), None) => HeaderMatch::exact(&spec.name, value.clone()),
        (None, Some(pattern)) => HeaderMatch::regex(&spec.name, pattern),
        _ => Err(ValidationError::InvalidHeader {
            name: spec.name.clone(),
            reason: "exactly one of `value` or `regex` is required".to_string(),
        }),
    }
}

/// Hosts covered by a TLS section redirect plaintext requests by default.
fn default_tls(tls_hosts: &[HostMatch], host: &HostMatch) -> TlsRequirement {
    let covered = tls_hosts.iter().any(|tls_host| {
        tls_host == host
            || matches!(
                (tls_host, host),
                (HostMatch::Wildcard { .. }, HostMatch::Exact(exact)) if tls_host.matches_host(exact)
            )
    });
    if covered {
        TlsRequirement::Redirect
    } else {
        TlsRequirement::Optional
    }
}

fn rule_id(ingress: &str, host: &HostMatch, path: &PathMatch, headers: &[HeaderMatch]) -> RuleId {
    RuleId::new(format!("{}:{}", ingress, conflict_key(host, path, headers)))
}

fn collect<T>(result: Result<T, ValidationError>, errors: &mut Vec<ValidationError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}
