//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::{backend::Endpoint, LoadBalancer};

/// Round-robin selector over healthy endpoints.
/// Stores an internal counter to rotate through the healthy subset.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_endpoint(&self, endpoints: &[Endpoint]) -> Option<Endpoint> {
        let healthy = endpoints.iter().filter(|e| e.is_healthy()).count();
        if healthy == 0 {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % healthy;
        endpoints.iter().filter(|e| e.is_healthy()).nth(index).copied()
    }
}
