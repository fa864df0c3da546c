//! Backend endpoints.
//!
//! # Responsibilities
//! - Represent a single endpoint of a backend service
//! - Carry its current health state

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Health state of an endpoint. Only `Healthy` endpoints receive traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single backend endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: SocketAddr,
    #[serde(default)]
    pub health: HealthState,
}

impl Endpoint {
    pub fn new(address: SocketAddr, health: HealthState) -> Self {
        Self { address, health }
    }

    pub fn healthy(address: SocketAddr) -> Self {
        Self::new(address, HealthState::Healthy)
    }

    pub fn is_healthy(&self) -> bool {
        self.health == HealthState::Healthy
    }
}
