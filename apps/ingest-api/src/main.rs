//! # Fleet Ingest API
//!
//! Edge receiver for device telemetry.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Ingest API Server                              │
//! │                                                                         │
//! │  Devices ───► HTTP (8080) ───► IngestService ───► PostgreSQL (local)   │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │                              ForwardingHandle ───► Central API          │
//! │                         (queue, retry, breaker)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleet_db::ConnectionManager;
use fleet_forward::ForwardingHandle;
use fleet_ingest::{router, AppState, IngestConfig, IngestService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Fleet Ingest API...");

    let config = IngestConfig::load().context("loading ingest configuration")?;
    let addr = config.bind_addr()?;

    let db = Arc::new(ConnectionManager::from_env().context("reading database settings")?);
    db.connect().await.context("connecting to the local database")?;
    info!("Local database ready");

    let forwarder = ForwardingHandle::from_config(&config.forward)?;
    match &forwarder {
        Some(f) => info!(destination = %f.destination(), "Forwarding enabled"),
        None => warn!("CENTRAL_SERVICE_URL not set, forwarding disabled"),
    }

    let service = Arc::new(IngestService::new(Arc::new(db.telemetry()?), forwarder));
    let app = router(AppState {
        service: service.clone(),
        db: db.clone(),
    });

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Ingest API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown(config.shutdown_grace()).await;
    db.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fleet=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
