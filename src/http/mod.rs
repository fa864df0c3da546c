//! HTTP data plane.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware layers)
//!     → request.rs (request ID, build RouteRequest)
//!     → dispatch (match → policies → resolve)
//!     → response.rs (outcome → status) or forward to endpoint
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
