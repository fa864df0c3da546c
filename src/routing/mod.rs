//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Rule Compilation (on every config change):
//!     IngressSpec[]
//!     → compile.rs (parse hosts, paths, headers, policies into Rules)
//!     → snapshot.rs (validate, sort by precedence, index by host)
//!     → store.rs (atomic swap of the active RuleSet)
//!
//! Incoming Request (host, path, headers)
//!     → router.rs (load current snapshot)
//!     → snapshot.rs (exact host → wildcard hosts → catch-all)
//!     → matcher.rs (evaluate path and header predicates)
//!     → Return: matched Rule or no match
//! ```
//!
//! # Design Decisions
//! - Rule sets are immutable; a config change builds a new one
//! - Validation is all-or-nothing: one bad rule rejects the whole set
//! - Precedence is computed from rule content, never from declaration order
//! - Readers never block on writers (copy-on-write via `arc-swap`)

pub mod compile;
pub mod error;
pub mod matcher;
pub mod request;
pub mod router;
pub mod rule;
pub mod snapshot;
pub mod store;

pub use error::{RuleSetRejected, ValidationError};
pub use matcher::{HeaderMatch, HostMatch, Matcher, PathKind, PathMatch, PathSpecificity};
pub use request::RouteRequest;
pub use router::{RouteMatch, Router};
pub use rule::{BackendRef, Precedence, Rule, RuleId};
pub use snapshot::{BackendCatalog, RuleSet, Version};
pub use store::RuleStore;
