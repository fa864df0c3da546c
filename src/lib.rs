//! Ingress routing core.
//!
//! Watches Ingress-style configuration, builds an immutable rule set, matches
//! requests against it, applies per-rule policies and resolves a backend
//! endpoint.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::IngressConfig;
pub use dispatch::{DecisionReason, Dispatcher, MatchResult, Outcome};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::{RouteRequest, Rule, RuleId, RuleStore};
