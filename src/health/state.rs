//! Endpoint health state machine.
//!
//! # State Transitions
//! ```text
//! Unknown/Healthy → Unhealthy: consecutive failures >= unhealthy_threshold
//! Unknown/Unhealthy → Healthy: consecutive successes >= healthy_threshold
//! ```
//!
//! # Design Decisions
//! - Hysteresis prevents flapping
//! - Counters reset on every transition
//! - The resolver's state wins over the tracked one, so external updates
//!   restart the count
//! - Only transitions are reported, so the resolver is written rarely

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use crate::load_balancer::HealthState;
use crate::routing::BackendRef;

pub type EndpointKey = (BackendRef, SocketAddr);

#[derive(Debug, Clone, Copy)]
struct Counters {
    state: HealthState,
    successes: u32,
    failures: u32,
}

#[derive(Debug)]
pub struct HealthTracker {
    healthy_threshold: u32,
    unhealthy_threshold: u32,
    endpoints: HashMap<EndpointKey, Counters>,
}

impl HealthTracker {
    pub fn new(healthy_threshold: u32, unhealthy_threshold: u32) -> Self {
        Self {
            healthy_threshold: healthy_threshold.max(1),
            unhealthy_threshold: unhealthy_threshold.max(1),
            endpoints: HashMap::new(),
        }
    }

    /// Record one probe result. `current` is the resolver's view of the
    /// endpoint; when it differs from the tracked state the counters restart
    /// from it. Returns the new state on a transition.
    pub fn observe(&mut self, key: EndpointKey, current: HealthState, success: bool) -> Option<HealthState> {
        let fresh = Counters {
            state: current,
            successes: 0,
            failures: 0,
        };
        let counters = self.endpoints.entry(key).or_insert(fresh);
        if counters.state != current {
            *counters = fresh;
        }

        let next = if success {
            counters.failures = 0;
            counters.successes = counters.successes.saturating_add(1);
            (counters.state != HealthState::Healthy && counters.successes >= self.healthy_threshold)
                .then_some(HealthState::Healthy)
        } else {
            counters.successes = 0;
            counters.failures = counters.failures.saturating_add(1);
            (counters.state != HealthState::Unhealthy && counters.failures >= self.unhealthy_threshold)
                .then_some(HealthState::Unhealthy)
        };

        if let Some(state) = next {
            counters.state = state;
            counters.successes = 0;
            counters.failures = 0;
        }
        next
    }

    pub fn state(&self, key: &EndpointKey) -> Option<HealthState> {
        self.endpoints.get(key).map(|c| c.state)
    }

    /// Forget endpoints that are no longer registered.
    pub fn retain(&mut self, live: &HashSet<EndpointKey>) {
        self.endpoints.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
