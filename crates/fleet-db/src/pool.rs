//! # Connection Manager
//!
//! Owns the PostgreSQL pool for one process. There is no global handle: the
//! manager is created in `main` and passed to whatever needs storage.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Connection Lifecycle                               │
//! │                                                                         │
//! │  DbSettings::from_env()        ← missing vars: fatal, never retried    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ConnectionManager::new(settings)         (not connected yet)          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  connect()                                                             │
//! │   ├── retry_with_backoff(database preset)                              │
//! │   │     └── connect_with_config()  ← DSN + pool bounds, one attempt    │
//! │   ├── migrate()                    ← ordered, all-or-nothing           │
//! │   └── pool stored                                                       │
//! │       │                                                                 │
//! │       ├──► health_check()  SELECT 1 with short timeout (readiness)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  shutdown()   cancels a connect in progress, closes the pool;          │
//! │               idempotent, no-op if never connected                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pool Bounds
//! | Setting              | sqlx option        |
//! |----------------------|--------------------|
//! | `max_open_conns`     | `max_connections`  |
//! | `max_idle_conns`     | `min_connections`  |
//! | `conn_max_lifetime`  | `max_lifetime`     |
//! | `conn_max_idle_time` | `idle_timeout`     |

use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use fleet_resilience::{retry_with_backoff, CancellationToken};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, DbSettings};
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::command::PgCommandRepository;
use crate::repository::telemetry::PgTelemetryRepository;

/// Resilient owner of the process-wide pool.
///
/// Share it behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct ConnectionManager {
    settings: DbSettings,
    pool: RwLock<Option<PgPool>>,
    connect_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    /// Creates an unconnected manager.
    pub fn new(settings: DbSettings) -> Self {
        ConnectionManager {
            settings,
            pool: RwLock::new(None),
            connect_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Validates the environment and creates an unconnected manager.
    pub fn from_env() -> DbResult<Self> {
        Ok(Self::new(DbSettings::from_env()?))
    }

    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    /// Opens the pool, retrying the handshake with the database preset, then
    /// applies migrations.
    ///
    /// Returns the existing pool when already connected.
    ///
    /// ## Errors
    /// * `DbError::ConnectionFailed` - every attempt failed (fatal at startup)
    /// * `DbError::MigrationFailed` - schema could not be applied (fatal)
    /// * `DbError::Cancelled` - `shutdown()` was called meanwhile
    pub async fn connect(&self) -> DbResult<PgPool> {
        let _connecting = self.connect_lock.lock().await;
        if let Some(pool) = self.current() {
            return Ok(pool);
        }

        let retry = self.settings.retry_config();
        info!(
            dsn = %self.settings.redacted_dsn(),
            max_attempts = retry.max_attempts,
            "Connecting to database"
        );

        let pool = retry_with_backoff(&self.shutdown, &retry, || self.connect_with_config())
            .await
            .map_err(|e| {
                error!(error = %e, "Database handshake failed");
                DbError::from(e)
            })?;

        info!(
            max_connections = self.settings.max_open_conns,
            min_connections = self.settings.min_connections(),
            "Database pool created"
        );

        if let Err(e) = migrations::run_migrations(&pool).await {
            error!(error = %e, "Migrations failed, closing pool");
            pool.close().await;
            return Err(e);
        }

        if self.shutdown.is_cancelled() {
            pool.close().await;
            return Err(DbError::Cancelled);
        }

        *self.pool.write().unwrap_or_else(PoisonError::into_inner) = Some(pool.clone());
        Ok(pool)
    }

    /// One handshake attempt with the configured pool bounds.
    pub async fn connect_with_config(&self) -> Result<PgPool, sqlx::Error> {
        let options = self.connect_options().map_err(|e| sqlx::Error::Configuration(e.into()))?;
        let settings = &self.settings;

        debug!(dsn = %settings.redacted_dsn(), "Opening connection pool");

        PgPoolOptions::new()
            .max_connections(settings.max_open_conns)
            .min_connections(settings.min_connections())
            .max_lifetime(settings.conn_max_lifetime)
            .idle_timeout(settings.conn_max_idle_time)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await
    }

    fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let dsn = self.settings.dsn()?;
        PgConnectOptions::from_str(dsn.as_str()).map_err(|_| ConfigError::InvalidValue {
            key: "DSN".to_string(),
            value: self.settings.redacted_dsn(),
        })
    }

    /// Re-applies migrations on the connected pool.
    pub async fn migrate(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool()?).await
    }

    /// The connected pool.
    pub fn pool(&self) -> DbResult<PgPool> {
        self.current().ok_or(DbError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<PgPool> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pings the pool within `health_check_timeout`.
    ///
    /// Never fatal; readiness endpoints turn an error into 503.
    pub async fn health_check(&self) -> DbResult<()> {
        let pool = self.pool()?;
        let timeout = self.settings.health_check_timeout;

        match tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(&pool)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                warn!(error = %e, "Database health check failed");
                Err(DbError::HealthCheckFailed(e.to_string()))
            }
            Err(_) => {
                warn!(?timeout, "Database health check timed out");
                Err(DbError::HealthCheckFailed(format!("no response within {timeout:?}")))
            }
        }
    }

    /// Cancels a connect in progress and closes the pool.
    ///
    /// Safe to call repeatedly and before `connect()`.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match pool {
            Some(pool) => {
                info!("Closing database connection pool");
                pool.close().await;
                info!("Database connection pool closed");
            }
            None => debug!("Shutdown requested with no open pool"),
        }
    }

    /// Command repository over the connected pool.
    pub fn commands(&self) -> DbResult<PgCommandRepository> {
        Ok(PgCommandRepository::new(self.pool()?))
    }

    /// Telemetry repository over the connected pool.
    pub fn telemetry(&self) -> DbResult<PgTelemetryRepository> {
        Ok(PgTelemetryRepository::new(self.pool()?))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_settings() -> DbSettings {
        // Port 1 on loopback refuses immediately.
        DbSettings::new("fleet", "fleet", "127.0.0.1", 1, "fleet")
            .connect_max_retries(2)
            .connect_initial_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_not_connected_operations() {
        let db = ConnectionManager::new(unreachable_settings());
        assert!(!db.is_connected());
        assert!(matches!(db.pool(), Err(DbError::NotConnected)));
        assert!(matches!(db.health_check().await, Err(DbError::NotConnected)));
        assert!(matches!(db.commands(), Err(DbError::NotConnected)));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_without_connection() {
        let db = ConnectionManager::new(unreachable_settings());
        db.shutdown().await;
        db.shutdown().await;
        assert!(!db.is_connected());
    }

    #[tokio::test]
    async fn test_connect_exhausts_retries() {
        let mut settings = unreachable_settings();
        settings.acquire_timeout = Duration::from_secs(2);
        let db = ConnectionManager::new(settings);

        match db.connect().await {
            Err(DbError::ConnectionFailed(msg)) => assert!(msg.contains("2 attempt(s)")),
            other => panic!("expected ConnectionFailed, got {other:?}"),
        }
        assert!(!db.is_connected());
    }

    #[tokio::test]
    async fn test_connect_after_shutdown_is_cancelled() {
        let db = ConnectionManager::new(unreachable_settings());
        db.shutdown().await;
        assert!(matches!(db.connect().await, Err(DbError::Cancelled)));
    }

    #[test]
    fn test_connect_options_from_dsn() {
        let db = ConnectionManager::new(DbSettings::new("fleet", "p@ss", "db", 5433, "telemetry"));
        let options = db.connect_options().unwrap();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_database(), Some("telemetry"));
        assert_eq!(options.get_username(), "fleet");
    }
}
