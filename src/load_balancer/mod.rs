//! Load balancing subsystem: the backend resolver.
//!
//! # Data Flow
//! ```text
//! Rule matched → BackendRef identified
//!     → resolver.rs (load the backend's endpoint snapshot)
//!     → round_robin.rs (rotate through healthy endpoints)
//!     → Return Endpoint or ResolveError
//!
//! Discovery / health signals:
//!     config services, admin feed, health monitor
//!     → resolver.rs (copy-on-write endpoint update)
//! ```
//!
//! # Design Decisions
//! - Only `Healthy` endpoints are selected; `Unknown` is not trusted yet
//! - One round-robin cursor per backend reference
//! - Endpoints are plain values, replaced wholesale on every change

pub mod backend;
pub mod resolver;
pub mod round_robin;

pub use backend::{Endpoint, HealthState};
pub use resolver::{BackendResolver, EndpointUpdate, ResolveError};
pub use round_robin::RoundRobin;

/// Endpoint selection strategy.
pub trait LoadBalancer: Send + Sync {
    /// Pick the next endpoint, or `None` if no endpoint is eligible.
    fn next_endpoint(&self, endpoints: &[Endpoint]) -> Option<Endpoint>;
}
