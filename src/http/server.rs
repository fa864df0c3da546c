//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (timeout, request ID, tracing)
//! - Serve the plaintext listener and the optional TLS listener
//! - Dispatch requests through the routing core
//! - Forward requests to the selected endpoint
//! - Run background tasks: health monitor, config reload, bucket sweeper,
//!   version reporter, admin API

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::schema::{IngressConfig, RateLimitSettings};
use crate::config::ConfigError;
use crate::dispatch::{Dispatcher, Outcome};
use crate::health::HealthMonitor;
use crate::http::request::{self as req, UuidRequestId};
use crate::http::response;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::BackendResolver;
use crate::net::tls::load_tls_config;
use crate::observability::reporter::spawn_version_reporter;
use crate::security::RateLimiter;

const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load TLS certificate: {0}")]
    Tls(std::io::Error),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub client: Client<HttpConnector, Body>,
    /// Whether this router serves the TLS listener.
    pub tls: bool,
}

/// HTTP data plane of the ingress router.
pub struct HttpServer {
    config: IngressConfig,
    dispatcher: Arc<Dispatcher>,
    client: Client<HttpConnector, Body>,
}

impl HttpServer {
    /// Create the server and apply the initial configuration.
    pub fn new(config: IngressConfig) -> Result<Self, ServerError> {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(BackendResolver::new())));
        dispatcher.apply_config(&config)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            config,
            dispatcher,
            client,
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &IngressConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self, tls: bool) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            client: self.client.clone(),
            tls,
        };

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// Serve until `shutdown` fires. Configurations received on
    /// `config_updates` are applied as they arrive; a rejected one leaves the
    /// running state untouched.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<IngressConfig>,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut tasks: Vec<JoinHandle<()>> = vec![
            spawn_version_reporter(self.dispatcher.store().subscribe(), shutdown.clone()),
            spawn_bucket_sweeper(
                self.dispatcher.limiter().clone(),
                self.config.rate_limit.clone(),
                shutdown.clone(),
            ),
            spawn_reload_loop(self.dispatcher.clone(), config_updates, shutdown.clone()),
        ];

        if self.config.health_check.enabled {
            let monitor = HealthMonitor::new(
                self.dispatcher.resolver().clone(),
                self.config.health_check.clone(),
            );
            tasks.push(tokio::spawn(monitor.run(shutdown.clone())));
        }

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            let app = admin::setup_admin_router(self.dispatcher.clone(), &self.config.admin.api_key);
            let mut signal = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = axum::serve(admin_listener, app)
                    .with_graceful_shutdown(async move { signal.recv().await })
                    .await
                {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }));
        }

        if let Some(tls) = &self.config.listener.tls {
            let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))
                .await
                .map_err(ServerError::Tls)?;
            let tls_addr: SocketAddr = tls
                .bind_address
                .parse()
                .map_err(|_| ServerError::InvalidAddress(tls.bind_address.clone()))?;

            let handle = axum_server::Handle::new();
            let drain = handle.clone();
            let mut signal = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                signal.recv().await;
                drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
            }));

            let app = self.router(true).into_make_service_with_connect_info::<SocketAddr>();
            tracing::info!(address = %tls_addr, "TLS listener starting");
            tasks.push(tokio::spawn(async move {
                if let Err(e) = axum_server::bind_rustls(tls_addr, rustls)
                    .handle(handle)
                    .serve(app)
                    .await
                {
                    tracing::error!(error = %e, "TLS listener failed");
                }
            }));
        }

        let app = self.router(false).into_make_service_with_connect_info::<SocketAddr>();
        let mut signal = shutdown;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.recv().await })
            .await?;

        for task in tasks {
            let _ = task.await;
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Dispatches the request, then either answers directly or forwards it.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let route = req::route_request(&request, peer.ip(), state.tls);
    let result = state.dispatcher.dispatch(&route);

    let endpoint = match &result.outcome {
        Outcome::Forward(endpoint) => *endpoint,
        outcome => {
            let query = request.uri().query();
            return response::outcome_response(outcome, query)
                .unwrap_or_else(response::bad_gateway);
        }
    };

    let request_id = req::request_id(&request).to_string();
    req::prepare_upstream(&mut request, endpoint.address, peer.ip(), state.tls);

    match state.client.request(request).await {
        Ok(upstream) => {
            tracing::debug!(
                request_id = %request_id,
                endpoint = %endpoint.address,
                status = %upstream.status(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Upstream responded"
            );
            response::from_upstream(upstream)
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                endpoint = %endpoint.address,
                error = %e,
                "Upstream error"
            );
            response::bad_gateway()
        }
    }
}

fn spawn_reload_loop(
    dispatcher: Arc<Dispatcher>,
    mut config_updates: mpsc::UnboundedReceiver<IngressConfig>,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                update = config_updates.recv() => {
                    let Some(config) = update else { break };
                    match dispatcher.apply_config(&config) {
                        Ok(version) => tracing::info!(version = %version, "Configuration reloaded"),
                        Err(e) => tracing::error!(error = %e, "Configuration rejected, keeping current state"),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

fn spawn_bucket_sweeper(
    limiter: Arc<RateLimiter>,
    settings: RateLimitSettings,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let idle = Duration::from_secs(settings.idle_secs);
        let mut ticker = tokio::time::interval(Duration::from_secs(settings.sweep_interval_secs.max(1)));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep_idle(idle, Instant::now());
                    if removed > 0 {
                        tracing::debug!(removed, remaining = limiter.len(), "Swept idle rate-limit buckets");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}
