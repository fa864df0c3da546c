//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered endpoint
//! - Feed results through the hysteresis tracker
//! - Publish transitions to the backend resolver

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time;

use crate::config::schema::HealthCheckConfig;
use crate::health::state::{EndpointKey, HealthTracker};
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::BackendResolver;

pub struct HealthMonitor {
    resolver: Arc<BackendResolver>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
    tracker: HealthTracker,
}

impl HealthMonitor {
    pub fn new(resolver: Arc<BackendResolver>, config: HealthCheckConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeout_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        let tracker = HealthTracker::new(config.healthy_threshold, config.unhealthy_threshold);

        Self {
            resolver,
            config,
            client,
            tracker,
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_all().await,
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor stopping");
                    break;
                }
            }
        }
    }

    /// Probe every endpoint once and apply any resulting transitions.
    pub async fn check_all(&mut self) {
        let mut live = HashSet::new();
        let mut probes = JoinSet::new();

        for (backend, endpoints) in self.resolver.snapshot() {
            for endpoint in endpoints.iter() {
                let key: EndpointKey = (backend.clone(), endpoint.address);
                live.insert(key.clone());

                let client = self.client.clone();
                let path = self.config.path.clone();
                let timeout = Duration::from_secs(self.config.timeout_secs);
                let (address, current) = (endpoint.address, endpoint.health);
                probes.spawn(async move {
                    let healthy = probe(&client, address, &path, timeout).await;
                    (key, current, healthy)
                });
            }
        }

        while let Some(joined) = probes.join_next().await {
            let Ok(((backend, address), current, healthy)) = joined else {
                continue;
            };
            if let Some(next) = self.tracker.observe((backend.clone(), address), current, healthy) {
                tracing::info!(backend = %backend, endpoint = %address, from = %current, to = %next, "Endpoint health changed");
                self.resolver.set_health(&backend, address, next);
            }
        }

        self.tracker.retain(&live);
    }
}

async fn probe(
    client: &Client<HttpConnector, Body>,
    address: SocketAddr,
    path: &str,
    timeout: Duration,
) -> bool {
    let request = match Request::builder()
        .method("GET")
        .uri(format!("http://{address}{path}"))
        .header("user-agent", "ingress-router-health-check")
        .body(Body::empty())
    {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build health check request");
            return false;
        }
    };

    match time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) => {
            let success = response.status().is_success();
            if !success {
                tracing::debug!(endpoint = %address, status = %response.status(), "Health check failed: non-success status");
            }
            success
        }
        Ok(Err(e)) => {
            tracing::debug!(endpoint = %address, error = %e, "Health check failed: connection error");
            false
        }
        Err(_) => {
            tracing::debug!(endpoint = %address, "Health check failed: timeout");
            false
        }
    }
}
