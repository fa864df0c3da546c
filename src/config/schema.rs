//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the ingress
//! router. All types derive Serde traits for deserialization from config files.
//! The `ingresses` section mirrors the shape of a Kubernetes Ingress resource,
//! with strongly-typed policy settings in place of annotations.

use serde::{Deserialize, Serialize};

use crate::routing::{BackendRef, PathKind};
use crate::security::{RateLimitPolicy, TlsRequirement};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IngressConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Active health check settings.
    pub health_check: HealthCheckConfig,

    /// Rate limiter housekeeping.
    pub rate_limit: RateLimitSettings,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Statically declared backend services and their endpoints.
    pub services: Vec<ServiceConfig>,

    /// Ingress resources.
    pub ingresses: Vec<IngressSpec>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plaintext bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS-terminating listener.
    pub tls: Option<TlsListenerConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS listener configuration. Certificates are provisioned externally.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    /// `RUST_LOG` takes precedence when set.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10,
            timeout_secs: 2,
            path: "/healthz".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Rate limiter bucket housekeeping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// How often idle buckets are swept, in seconds.
    pub sweep_interval_secs: u64,

    /// Buckets untouched for this long are dropped, in seconds.
    pub idle_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            idle_secs: 300,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// A backend service port and its statically known endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service name.
    pub name: String,

    /// Service port.
    pub port: u16,

    /// Optional named endpoint subset (e.g., "canary").
    #[serde(default)]
    pub endpoint_set: Option<String>,

    /// Endpoint addresses (e.g., "10.0.0.12:8080").
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl ServiceConfig {
    pub fn backend_ref(&self) -> BackendRef {
        BackendRef {
            service: self.name.clone(),
            port: self.port,
            endpoint_set: self.endpoint_set.clone(),
        }
    }
}

/// One Ingress resource.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngressSpec {
    /// Ingress name, unique across the config. Prefixes every rule id.
    pub name: String,

    /// Backend for requests no rule matches.
    #[serde(default)]
    pub default_backend: Option<BackendRef>,

    /// Policies applied to every rule of this ingress.
    #[serde(default)]
    pub policy: PolicySpec,

    /// TLS sections: hosts served over TLS.
    #[serde(default)]
    pub tls: Vec<IngressTlsSpec>,

    /// Host rules.
    #[serde(default)]
    pub rules: Vec<IngressRuleSpec>,
}

/// Typed replacement for policy annotations.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicySpec {
    /// TLS requirement. When unset, hosts listed in a TLS section redirect
    /// plaintext requests and all other hosts accept them.
    pub tls: Option<TlsRequirement>,

    /// Source CIDRs allowed to reach this ingress. Empty allows everyone.
    pub allow_list: Vec<String>,

    /// Per-rule request rate ceiling.
    pub rate_limit: Option<RateLimitPolicy>,
}

/// TLS section of an ingress.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IngressTlsSpec {
    /// Hosts covered by the certificate.
    pub hosts: Vec<String>,

    /// Name of the certificate secret. Informational: issuance is external.
    pub secret_name: Option<String>,
}

/// A host and its HTTP paths.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngressRuleSpec {
    /// Host pattern (exact or `*.suffix`). Absent matches any host.
    #[serde(default)]
    pub host: Option<String>,

    pub paths: Vec<HttpPathSpec>,
}

/// A single path rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpPathSpec {
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub path_type: PathKind,

    pub backend: BackendRef,

    /// Header predicates; all must match.
    #[serde(default)]
    pub headers: Vec<HeaderSpec>,
}

fn default_path() -> String {
    "/".to_string()
}

/// A header predicate: exactly one of `value` or `regex`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderSpec {
    pub name: String,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub regex: Option<String>,
}
