use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::load_balancer::{Endpoint, EndpointUpdate};
use crate::routing::{BackendRef, Rule};
use crate::security::{PolicyKind, TlsRequirement};

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub rule_set_version: u64,
    pub rules: usize,
    pub backends: usize,
}

#[derive(Debug, Serialize)]
pub struct RuleSummary {
    pub id: String,
    pub host: String,
    pub path_type: String,
    pub path: String,
    pub headers: Vec<String>,
    pub backend: BackendRef,
    pub tls: TlsRequirement,
    pub policies: Vec<PolicyKind>,
}

impl From<&Rule> for RuleSummary {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id.to_string(),
            host: rule.host.to_string(),
            path_type: rule.path.kind().to_string(),
            path: rule.path.pattern().to_string(),
            headers: rule.headers.iter().map(ToString::to_string).collect(),
            backend: rule.backend.clone(),
            tls: rule.policy.tls,
            policies: rule.policy.enforced(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub backend: BackendRef,
    pub healthy: usize,
    pub endpoints: Vec<Endpoint>,
}

impl BackendStatus {
    fn new(backend: BackendRef, endpoints: &[Endpoint]) -> Self {
        Self {
            healthy: endpoints.iter().filter(|e| e.is_healthy()).count(),
            endpoints: endpoints.to_vec(),
            backend,
        }
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.dispatcher.store().current_snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        rule_set_version: snapshot.version().get(),
        rules: snapshot.len(),
        backends: state.dispatcher.resolver().len(),
    })
}

/// Rules of the active snapshot, highest precedence first.
pub async fn get_rules(State(state): State<AdminState>) -> Json<Vec<RuleSummary>> {
    let snapshot = state.dispatcher.store().current_snapshot();
    Json(snapshot.rules().iter().map(|r| RuleSummary::from(r.as_ref())).collect())
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let backends = state
        .dispatcher
        .resolver()
        .snapshot()
        .into_iter()
        .map(|(backend, endpoints)| BackendStatus::new(backend, &endpoints))
        .collect();
    Json(backends)
}

/// Replace one backend's endpoint set.
pub async fn put_backends(
    State(state): State<AdminState>,
    Json(update): Json<EndpointUpdate>,
) -> Result<Json<BackendStatus>, (StatusCode, String)> {
    if update.backend.service.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "backend.service must not be empty".into()));
    }

    let resolver = state.dispatcher.resolver();
    resolver.update(update.backend.clone(), update.endpoints);
    let endpoints = resolver.endpoints(&update.backend).unwrap_or_default();
    Ok(Json(BackendStatus::new(update.backend, &endpoints)))
}
