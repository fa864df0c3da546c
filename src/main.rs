//! Ingress router
//!
//! Routes HTTP traffic according to Ingress-style rules loaded from a TOML
//! file, with hot reload.
//!
//! # Architecture Overview
//!
//! ```text
//!     Config file ──▶ watcher ──▶ Dispatcher::apply_config
//!                                   ├─▶ BackendResolver (services)
//!                                   └─▶ RuleStore::replace (ingresses)
//!
//!     Client ──▶ http server ──▶ Dispatcher::dispatch
//!                                   ├─▶ RuleSet::match_request
//!                                   ├─▶ PolicyChain (tls, allow-list, rate limit)
//!                                   └─▶ BackendResolver::resolve ──▶ Endpoint
//!            ◀── response / forwarded backend response
//!
//!     Health monitor ──▶ BackendResolver::set_health
//!     Admin API ──▶ inspection, PUT /admin/backends
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ingress_router::config::{load_config, ConfigWatcher, IngressConfig};
use ingress_router::lifecycle::{wait_for_signal, Shutdown};
use ingress_router::observability::logging;
use ingress_router::HttpServer;

#[derive(Parser)]
#[command(name = "ingress-router")]
#[command(about = "Ingress routing core: rule matching, policies and backend resolution", long_about = None)]
struct Args {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long, env = "INGRESS_CONFIG")]
    config: Option<PathBuf>,

    /// Do not reload the configuration file on change.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => IngressConfig::default(),
    };
    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ingress-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        ingresses = config.ingresses.len(),
        tls = config.listener.tls.is_some(),
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) if !args.no_watch => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        _ => {
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    tokio::select! {
        _ = wait_for_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
        result = &mut server_task => result??,
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
