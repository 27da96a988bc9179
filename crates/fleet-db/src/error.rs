//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  PostgreSQL error (sqlx::Error, SQLSTATE code)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├──► startup: fatal (config, handshake, migration)               │
//! │       ├──► readiness probe: HealthCheckFailed → 503                    │
//! │       ▼                                                                 │
//! │  ApiError (in apps) ← Serialized for clients                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use fleet_resilience::RetryError;
use thiserror::Error;

use crate::config::ConfigError;

/// PostgreSQL SQLSTATE codes we categorize.
mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
}

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Required settings missing or malformed. Never retried.
    #[error("Database configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate value violates constraint '{constraint}'")]
    UniqueViolation { constraint: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Creating a command for a device the central service never saw
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (e.g. unknown status string).
    #[error("Check constraint violated: {message}")]
    CheckViolation { message: String },

    /// Handshake failed, including after retries.
    ///
    /// ## When This Occurs
    /// - Database container not accepting connections yet (retried)
    /// - Wrong host/port/credentials (retried, then fatal)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An operation needed the pool before `connect()` succeeded, or after
    /// `shutdown()`.
    #[error("Database is not connected")]
    NotConnected,

    /// Connection attempt abandoned because shutdown started.
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// Migration for one entity failed; the whole schema change was rolled back.
    #[error("Migration failed for {entity}: {message}")]
    MigrationFailed { entity: String, message: String },

    /// Readiness ping failed or timed out.
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A stored row could not be mapped back to a domain type.
    #[error("Invalid data in {table}: {message}")]
    InvalidData { table: String, message: String },

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Errors an operator has to fix; retrying does not help.
    pub fn is_config_error(&self) -> bool {
        matches!(self, DbError::Config(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound        → DbError::NotFound
/// sqlx::Error::Database (23505)   → DbError::UniqueViolation
/// sqlx::Error::Database (23503)   → DbError::ForeignKeyViolation
/// sqlx::Error::Database (23514)   → DbError::CheckViolation
/// sqlx::Error::Database (other)   → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut       → DbError::PoolExhausted
/// sqlx::Error::PoolClosed         → DbError::NotConnected
/// sqlx::Error::Io / Tls           → DbError::ConnectionFailed
/// Other                           → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some(sqlstate::UNIQUE_VIOLATION) => DbError::UniqueViolation {
                        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                    },
                    Some(sqlstate::FOREIGN_KEY_VIOLATION) => {
                        DbError::ForeignKeyViolation { message }
                    }
                    Some(sqlstate::CHECK_VIOLATION) => DbError::CheckViolation { message },
                    _ => DbError::QueryFailed(message),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::NotConnected,

            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => DbError::ConnectionFailed(err.to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

/// Outcome of the retried handshake.
impl From<RetryError<sqlx::Error>> for DbError {
    fn from(err: RetryError<sqlx::Error>) -> Self {
        match err {
            RetryError::Exhausted { attempts, source } | RetryError::Permanent { attempts, source } => {
                DbError::ConnectionFailed(format!("{source} (after {attempts} attempt(s))"))
            }
            RetryError::Cancelled { .. } => DbError::Cancelled,
            RetryError::DeadlineExceeded { timeout } => {
                DbError::ConnectionFailed(format!("deadline of {timeout:?} exceeded"))
            }
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
