//! Network layer subsystem.
//!
//! TLS termination for the optional HTTPS listener. Certificates are
//! provisioned externally and read from disk at startup.

pub mod tls;
