//! Metrics emission.
//!
//! # Metrics
//! - `ingress_decisions_total` (counter): routing decisions by `reason`
//! - `ingress_rule_set_version` (gauge): version of the active rule set
//! - `ingress_healthy_endpoints` (gauge): healthy endpoints per `backend`
//!
//! # Design Decisions
//! - Emitted through the `metrics` facade; installing a recorder/exporter is
//!   left to the embedding binary
//! - Without a recorder every call is a no-op

use ::metrics::{counter, gauge};

use crate::routing::{BackendRef, Version};

pub const DECISIONS_TOTAL: &str = "ingress_decisions_total";
pub const RULE_SET_VERSION: &str = "ingress_rule_set_version";
pub const HEALTHY_ENDPOINTS: &str = "ingress_healthy_endpoints";

pub fn record_decision(reason: &'static str) {
    counter!(DECISIONS_TOTAL, "reason" => reason).increment(1);
}

pub fn record_rule_set_version(version: Version) {
    gauge!(RULE_SET_VERSION).set(version.get() as f64);
}

pub fn record_healthy_endpoints(backend: &BackendRef, healthy: usize) {
    gauge!(HEALTHY_ENDPOINTS, "backend" => backend.to_string()).set(healthy as f64);
}
