//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: rule, version, reason)
//!     → metrics.rs (decision counters, version and health gauges)
//!
//! Rule store version channel:
//!     → reporter.rs (log + gauge every published version)
//! ```
//!
//! # Design Decisions
//! - Structured logging through `tracing`; the subscriber is installed once
//!   by the binary (logging.rs)
//! - Metrics go through the `metrics` facade; no exporter is bundled

pub mod logging;
pub mod metrics;
pub mod reporter;
