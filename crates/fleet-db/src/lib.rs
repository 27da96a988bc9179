//! # fleet-db: PostgreSQL Layer for the Fleet Platform
//!
//! Connection management, schema and repositories shared by the ingestion
//! service and the central service.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Fleet Data Flow                                  │
//! │                                                                         │
//! │  ingest-api handler             central-api handler                    │
//! │       │                               │                                 │
//! │       ▼                               ▼                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     fleet-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ Connection    │    │ Repositories  │    │  Migrations  │  │   │
//! │  │   │ Manager       │    │ + Lifecycle   │    │  (ordered)   │  │   │
//! │  │   │ (pool.rs)     │    │               │    │              │  │   │
//! │  │   │ retry, bounds │◄───│ CommandStore  │    │ devices      │  │   │
//! │  │   │ health, close │    │ TelemetryStore│    │ metrics ...  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PostgreSQL (one database per service)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Env-driven settings and DSN construction
//! - [`pool`] - [`ConnectionManager`]
//! - [`migrations`] - Per-entity schema in dependency order
//! - [`repository`] - Storage traits, Pg and in-memory implementations
//! - [`lifecycle`] - Remote command orchestration
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleet_db::{CommandLifecycle, ConnectionManager};
//!
//! let db = Arc::new(ConnectionManager::from_env()?);
//! db.connect().await?;                 // retries, then migrates
//!
//! let commands = CommandLifecycle::new(Arc::new(db.commands()?));
//! let cmd = commands.create("d1", "restart").await?;
//!
//! db.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{validate_env_vars, ConfigError, DbSettings, REQUIRED_ENV_VARS};
pub use error::{DbError, DbResult};
pub use lifecycle::{CommandError, CommandLifecycle, CommandResult};
pub use pool::ConnectionManager;

pub use repository::{
    CommandStore, MemoryCommandStore, MemoryTelemetryStore, PgCommandRepository,
    PgTelemetryRepository, TelemetryStore,
};
