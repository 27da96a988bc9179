//! # Fleet Central API
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Central API Server                             │
//! │                                                                         │
//! │  Ingest APIs ───► HTTP (8081) ───► TelemetryStore ───► PostgreSQL      │
//! │                                                            ▲            │
//! │  Dashboard / Devices ───► CommandLifecycle ────────────────┘            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleet_central::{router, AppState, CentralConfig};
use fleet_db::{CommandLifecycle, ConnectionManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Fleet Central API...");

    let config = CentralConfig::from_env().context("loading central configuration")?;

    let db = Arc::new(ConnectionManager::from_env().context("reading database settings")?);
    db.connect().await.context("connecting to the central database")?;
    info!("Central database ready");

    let app = router(AppState {
        telemetry: Arc::new(db.telemetry()?),
        commands: CommandLifecycle::new(Arc::new(db.commands()?)),
        db: db.clone(),
        history_limit: config.history_limit,
    });

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("Central API listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

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
