//! Security subsystem: the per-rule policy chain.
//!
//! # Data Flow
//! ```text
//! Matched rule + request:
//!     → tls.rs (plaintext allowed, denied or redirected)
//!     → access_control.rs (source address in allow-list)
//!     → rate_limit.rs (token bucket per rule / client)
//!     → Allow, Deny or RateLimited
//! ```
//!
//! # Design Decisions
//! - Fixed evaluation order, first non-Allow decision wins
//! - Policies are typed configuration on the rule, not string annotations
//! - Absent configuration means the policy is not enforced

pub mod access_control;
pub mod chain;
pub mod policy;
pub mod rate_limit;
pub mod tls;

pub use access_control::AllowList;
pub use chain::PolicyChain;
pub use policy::{DenyReason, PolicyConfig, PolicyDecision, PolicyKind, PolicyVerdict};
pub use rate_limit::{RateLimitPolicy, RateLimiter};
pub use tls::TlsRequirement;
