//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each registered endpoint
//!     → Feed result to state.rs
//!     → On transition: BackendResolver::set_health
//!
//! State machine (state.rs):
//!     Unknown → Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - The monitor owns the tracker; the resolver only sees transitions
//! - Health state is per endpoint of a backend reference

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::HealthTracker;
