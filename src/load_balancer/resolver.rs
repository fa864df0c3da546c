//! Backend resolution.
//!
//! # Responsibilities
//! - Hold the live endpoint set of every backend reference
//! - Apply discovery updates and health signals
//! - Select one healthy endpoint per request
//!
//! # Design Decisions
//! - Registry and per-backend endpoint lists are `arc-swap` snapshots: reads
//!   never lock
//! - Writers to one backend are serialized by that backend's mutex only
//! - Registering or removing a backend rebuilds the registry map under a
//!   separate registry mutex

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use crate::load_balancer::backend::{Endpoint, HealthState};
use crate::load_balancer::round_robin::RoundRobin;
use crate::load_balancer::LoadBalancer;
use crate::observability::metrics;
use crate::routing::{BackendCatalog, BackendRef};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("backend {0} has no healthy endpoints")]
    NoHealthyBackend(BackendRef),

    #[error("backend {0} is not registered")]
    UnknownBackend(BackendRef),
}

/// Service-discovery message: the full endpoint set of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointUpdate {
    pub backend: BackendRef,
    pub endpoints: Vec<Endpoint>,
}

struct BackendEntry {
    endpoints: ArcSwap<Vec<Endpoint>>,
    balancer: Box<dyn LoadBalancer>,
    update: Mutex<()>,
}

impl BackendEntry {
    fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints: ArcSwap::from_pointee(endpoints),
            balancer: Box::new(RoundRobin::new()),
            update: Mutex::new(()),
        }
    }

    /// Copy-on-write modification of the endpoint list.
    fn modify<F>(&self, f: F) -> Arc<Vec<Endpoint>>
    where
        F: FnOnce(&[Endpoint]) -> Vec<Endpoint>,
    {
        let _guard = self.update.lock().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(f(&self.endpoints.load()));
        self.endpoints.store(next.clone());
        next
    }
}

type Registry = HashMap<BackendRef, Arc<BackendEntry>>;

/// Live view of every backend's endpoints.
pub struct BackendResolver {
    registry: ArcSwap<Registry>,
    registry_lock: Mutex<()>,
}

impl BackendResolver {
    pub fn new() -> Self {
        Self {
            registry: ArcSwap::from_pointee(HashMap::new()),
            registry_lock: Mutex::new(()),
        }
    }

    /// Select an endpoint for `backend`, round-robin among healthy ones.
    pub fn resolve(&self, backend: &BackendRef) -> Result<Endpoint, ResolveError> {
        let registry = self.registry.load();
        let entry = registry
            .get(backend)
            .ok_or_else(|| ResolveError::UnknownBackend(backend.clone()))?;

        let endpoints = entry.endpoints.load();
        entry.balancer.next_endpoint(&endpoints).ok_or_else(|| {
            tracing::debug!(
                backend = %backend,
                endpoints = endpoints.len(),
                "No healthy endpoints"
            );
            ResolveError::NoHealthyBackend(backend.clone())
        })
    }

    /// Replace the endpoint set of `backend`, registering it if new.
    pub fn update(&self, backend: BackendRef, endpoints: Vec<Endpoint>) {
        let endpoints = dedup(endpoints);
        let entry = self.entry_or_insert(&backend);
        let next = entry.modify(|_| endpoints);
        tracing::info!(backend = %backend, endpoints = next.len(), "Backend endpoints updated");
        report(&backend, &next);
    }

    /// Replace the address set of `backend`, keeping the health of addresses
    /// already known. New addresses start as `initial`.
    pub fn sync_addresses(&self, backend: BackendRef, addresses: &[SocketAddr], initial: HealthState) {
        let entry = self.entry_or_insert(&backend);
        let next = entry.modify(|current| {
            let known: HashMap<SocketAddr, HealthState> =
                current.iter().map(|e| (e.address, e.health)).collect();
            dedup(
                addresses
                    .iter()
                    .map(|addr| Endpoint::new(*addr, known.get(addr).copied().unwrap_or(initial)))
                    .collect(),
            )
        });
        report(&backend, &next);
    }

    /// Change one endpoint's health. Returns false if the backend or address
    /// is unknown.
    pub fn set_health(&self, backend: &BackendRef, address: SocketAddr, health: HealthState) -> bool {
        let registry = self.registry.load();
        let Some(entry) = registry.get(backend) else {
            return false;
        };

        let mut found = false;
        let next = entry.modify(|current| {
            current
                .iter()
                .map(|e| {
                    if e.address == address {
                        found = true;
                        Endpoint::new(e.address, health)
                    } else {
                        *e
                    }
                })
                .collect()
        });

        if found {
            tracing::debug!(backend = %backend, endpoint = %address, health = %health, "Endpoint health set");
            report(backend, &next);
        }
        found
    }

    pub fn remove(&self, backend: &BackendRef) -> bool {
        let _guard = self.registry_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.registry.load();
        if !current.contains_key(backend) {
            return false;
        }
        let mut next = Registry::clone(&current);
        next.remove(backend);
        self.registry.store(Arc::new(next));
        metrics::record_healthy_endpoints(backend, 0);
        tracing::info!(backend = %backend, "Backend removed");
        true
    }

    pub fn endpoints(&self, backend: &BackendRef) -> Option<Arc<Vec<Endpoint>>> {
        self.registry.load().get(backend).map(|e| e.endpoints.load_full())
    }

    /// Every backend and its endpoints, ordered by backend reference.
    pub fn snapshot(&self) -> Vec<(BackendRef, Arc<Vec<Endpoint>>)> {
        let mut all: Vec<_> = self
            .registry
            .load()
            .iter()
            .map(|(backend, entry)| (backend.clone(), entry.endpoints.load_full()))
            .collect();
        all.sort_by(|(a, _), (b, _)| a.cmp(b));
        all
    }

    pub fn len(&self) -> usize {
        self.registry.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.load().is_empty()
    }

    fn entry_or_insert(&self, backend: &BackendRef) -> Arc<BackendEntry> {
        if let Some(entry) = self.registry.load().get(backend) {
            return entry.clone();
        }

        let _guard = self.registry_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.registry.load();
        if let Some(entry) = current.get(backend) {
            return entry.clone();
        }

        let entry = Arc::new(BackendEntry::new(Vec::new()));
        let mut next = Registry::clone(&current);
        next.insert(backend.clone(), entry.clone());
        self.registry.store(Arc::new(next));
        entry
    }
}

impl Default for BackendResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendCatalog for BackendResolver {
    fn contains(&self, backend: &BackendRef) -> bool {
        self.registry.load().contains_key(backend)
    }
}

impl std::fmt::Debug for BackendResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendResolver")
            .field("backends", &self.len())
            .finish_non_exhaustive()
    }
}

fn dedup(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut seen = std::collections::HashSet::with_capacity(endpoints.len());
    endpoints.into_iter().filter(|e| seen.insert(e.address)).collect()
}

fn report(backend: &BackendRef, endpoints: &[Endpoint]) {
    let healthy = endpoints.iter().filter(|e| e.is_healthy()).count();
    metrics::record_healthy_endpoints(backend, healthy);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("10.0.0.1:{port}").parse().unwrap()
    }

    fn svc() -> BackendRef {
        BackendRef::new("svc-a", 80)
    }

    #[test]
    fn test_unknown_backend() {
        let resolver = BackendResolver::new();
        assert_eq!(resolver.resolve(&svc()), Err(ResolveError::UnknownBackend(svc())));
        assert!(!resolver.contains(&svc()));
    }

    #[test]
    fn test_no_healthy_backend() {
        let resolver = BackendResolver::new();
        resolver.update(
            svc(),
            vec![
                Endpoint::new(addr(1), HealthState::Unhealthy),
                Endpoint::new(addr(2), HealthState::Unknown),
            ],
        );
        assert!(resolver.contains(&svc()));
        assert_eq!(resolver.resolve(&svc()), Err(ResolveError::NoHealthyBackend(svc())));

        resolver.update(svc(), vec![]);
        assert_eq!(resolver.resolve(&svc()), Err(ResolveError::NoHealthyBackend(svc())));
    }

    #[test]
    fn test_rotates_healthy_endpoints() {
        let resolver = BackendResolver::new();
        resolver.update(svc(), vec![Endpoint::healthy(addr(1)), Endpoint::healthy(addr(2))]);

        let picks: Vec<u16> = (0..4).map(|_| resolver.resolve(&svc()).unwrap().address.port()).collect();
        assert_eq!(picks, vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_set_health() {
        let resolver = BackendResolver::new();
        resolver.update(svc(), vec![Endpoint::healthy(addr(1)), Endpoint::healthy(addr(2))]);

        assert!(resolver.set_health(&svc(), addr(1), HealthState::Unhealthy));
        for _ in 0..3 {
            assert_eq!(resolver.resolve(&svc()).unwrap().address, addr(2));
        }

        assert!(!resolver.set_health(&svc(), addr(9), HealthState::Healthy));
        assert!(!resolver.set_health(&BackendRef::new("other", 80), addr(1), HealthState::Healthy));
    }

    #[test]
    fn test_sync_preserves_health() {
        let resolver = BackendResolver::new();
        resolver.sync_addresses(svc(), &[addr(1), addr(2)], HealthState::Unknown);
        resolver.set_health(&svc(), addr(1), HealthState::Healthy);

        resolver.sync_addresses(svc(), &[addr(1), addr(3), addr(3)], HealthState::Unknown);
        let endpoints = resolver.endpoints(&svc()).unwrap();
        assert_eq!(
            *endpoints,
            vec![
                Endpoint::new(addr(1), HealthState::Healthy),
                Endpoint::new(addr(3), HealthState::Unknown),
            ]
        );
    }

    #[test]
    fn test_remove_and_snapshot_order() {
        let resolver = BackendResolver::new();
        resolver.update(BackendRef::new("svc-b", 80), vec![]);
        resolver.update(svc(), vec![]);
        resolver.update(svc().with_endpoint_set("canary"), vec![]);

        let names: Vec<String> = resolver.snapshot().iter().map(|(b, _)| b.to_string()).collect();
        assert_eq!(names, vec!["svc-a:80", "svc-a:80/canary", "svc-b:80"]);

        assert!(resolver.remove(&svc()));
        assert!(!resolver.remove(&svc()));
        assert_eq!(resolver.len(), 2);
    }

    #[test]
    fn test_readers_during_updates() {
        let resolver = Arc::new(BackendResolver::new());
        resolver.update(svc(), vec![Endpoint::healthy(addr(1))]);

        let reader = {
            let resolver = resolver.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let endpoint = resolver.resolve(&svc()).unwrap();
                    assert!(endpoint.address.port() <= 2);
                }
            })
        };
        for i in 0..100 {
            let port = 1 + (i % 2) as u16;
            resolver.update(svc(), vec![Endpoint::healthy(addr(port))]);
        }
        reader.join().unwrap();
    }
}
