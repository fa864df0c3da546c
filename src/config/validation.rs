//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation of server-level settings (serde handles syntax)
//! - Validate value ranges (intervals > 0, thresholds > 0)
//! - Check addresses parse and names are unique
//!
//! # Design Decisions
//! - Returns all issues, not just the first
//! - Rule-level problems (patterns, conflicts) are reported by rule
//!   compilation and the rule store, not here

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::IngressConfig;

/// A single configuration problem, located by its config path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ConfigIssue {
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &IngressConfig) -> Result<(), Vec<ConfigIssue>> {
    let mut issues = Vec::new();

    check_addr(&mut issues, "listener.bind_address", &config.listener.bind_address);
    if let Some(tls) = &config.listener.tls {
        check_addr(&mut issues, "listener.tls.bind_address", &tls.bind_address);
        if tls.cert_path.is_empty() {
            issues.push(ConfigIssue::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            issues.push(ConfigIssue::new("listener.tls.key_path", "must not be empty"));
        }
    }

    if config.admin.enabled {
        check_addr(&mut issues, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            issues.push(ConfigIssue::new("admin.api_key", "required when the admin API is enabled"));
        }
    }

    let hc = &config.health_check;
    if hc.enabled {
        if hc.interval_secs == 0 {
            issues.push(ConfigIssue::new("health_check.interval_secs", "must be greater than zero"));
        }
        if hc.timeout_secs == 0 {
            issues.push(ConfigIssue::new("health_check.timeout_secs", "must be greater than zero"));
        }
        if hc.unhealthy_threshold == 0 || hc.healthy_threshold == 0 {
            issues.push(ConfigIssue::new("health_check", "thresholds must be greater than zero"));
        }
        if !hc.path.starts_with('/') {
            issues.push(ConfigIssue::new("health_check.path", "must start with '/'"));
        }
    }

    if config.rate_limit.sweep_interval_secs == 0 {
        issues.push(ConfigIssue::new("rate_limit.sweep_interval_secs", "must be greater than zero"));
    }

    if config.timeouts.connect_secs == 0 || config.timeouts.request_secs == 0 {
        issues.push(ConfigIssue::new("timeouts", "timeouts must be greater than zero"));
    }

    let mut services = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = format!("services[{i}]");
        if service.name.is_empty() {
            issues.push(ConfigIssue::new(&field, "name must not be empty"));
        }
        if !services.insert(service.backend_ref()) {
            issues.push(ConfigIssue::new(
                &field,
                format!("duplicate service {}", service.backend_ref()),
            ));
        }
        for (j, endpoint) in service.endpoints.iter().enumerate() {
            check_addr(&mut issues, &format!("{field}.endpoints[{j}]"), endpoint);
        }
    }

    let mut ingresses = HashSet::new();
    for (i, ingress) in config.ingresses.iter().enumerate() {
        let field = format!("ingresses[{i}].name");
        if ingress.name.is_empty() {
            issues.push(ConfigIssue::new(&field, "must not be empty"));
        } else if !ingresses.insert(ingress.name.as_str()) {
            issues.push(ConfigIssue::new(&field, format!("duplicate ingress {:?}", ingress.name)));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn check_addr(issues: &mut Vec<ConfigIssue>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        issues.push(ConfigIssue::new(field, format!("invalid socket address {value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{IngressSpec, ServiceConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&IngressConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_issues() {
        let mut config = IngressConfig::default();
        config.listener.bind_address = "nope".into();
        config.admin.enabled = true;
        config.services.push(ServiceConfig {
            name: "svc-a".into(),
            port: 80,
            endpoint_set: None,
            endpoints: vec!["10.0.0.1".into()],
        });
        let ingress: IngressSpec = toml::from_str(r#"name = "web""#).unwrap();
        config.ingresses = vec![ingress.clone(), ingress];

        let issues = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "admin.api_key",
                "services[0].endpoints[0]",
                "ingresses[1].name",
            ]
        );
    }
}
