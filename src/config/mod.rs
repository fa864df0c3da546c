//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (server-level semantic checks)
//!     → routing::compile (ingress rules, checked at load time)
//!     → IngressConfig
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → sent to the server, which applies it through the dispatcher
//!     → on any error the running configuration stays in place
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Ingress policies are typed fields, not annotations

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{IngressConfig, IngressSpec, ListenerConfig, ServiceConfig};
pub use validation::ConfigIssue;
pub use watcher::ConfigWatcher;
