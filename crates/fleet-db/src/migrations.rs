//! # Schema Migrations
//!
//! Per-entity DDL applied in dependency order.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  ConnectionManager::connect() (after the handshake)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                 │
//! │  SELECT pg_advisory_xact_lock(..)   ← one migrator per database        │
//! │       │                                                                 │
//! │       ├── devices          (independent)                               │
//! │       ├── metrics          → devices                                   │
//! │       ├── alerts           → devices                                   │
//! │       ├── activities       → devices                                   │
//! │       └── remote_commands  → devices                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT  (any failure → ROLLBACK, nothing partial is left behind)      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Add statements to the entity's entry, or a new entry after every
//!    entity it references
//! 2. Write idempotent SQL (`IF NOT EXISTS`)
//! 3. List referenced tables in `depends_on`; a unit test enforces the order

use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// Key for `pg_advisory_xact_lock`, shared by both services.
const MIGRATION_LOCK_KEY: i64 = 0x666c_6565_7464_62;

/// Schema for one entity.
#[derive(Debug)]
pub struct Migration {
    pub entity: &'static str,
    pub depends_on: &'static [&'static str],
    pub statements: &'static [&'static str],
}

/// Every entity, independent ones first.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        entity: "devices",
        depends_on: &[],
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS devices (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                device_type TEXT,
                os          TEXT,
                ip_address  TEXT,
                last_seen   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                is_online   BOOLEAN NOT NULL DEFAULT TRUE,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#],
    },
    Migration {
        entity: "metrics",
        depends_on: &["devices"],
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id           BIGSERIAL PRIMARY KEY,
                device_id    TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                recorded_at  TIMESTAMPTZ NOT NULL,
                cpu_usage    DOUBLE PRECISION NOT NULL,
                memory_usage DOUBLE PRECISION NOT NULL,
                disk_usage   DOUBLE PRECISION NOT NULL,
                uptime_secs  BIGINT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_metrics_device_time ON metrics (device_id, recorded_at DESC)",
        ],
    },
    Migration {
        entity: "alerts",
        depends_on: &["devices"],
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id          BIGSERIAL PRIMARY KEY,
                device_id   TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                raised_at   TIMESTAMPTZ NOT NULL,
                severity    TEXT NOT NULL CHECK (severity IN ('info', 'warning', 'critical')),
                alert_type  TEXT NOT NULL,
                message     TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_alerts_device_time ON alerts (device_id, raised_at DESC)",
        ],
    },
    Migration {
        entity: "activities",
        depends_on: &["devices"],
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                id            BIGSERIAL PRIMARY KEY,
                device_id     TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                occurred_at   TIMESTAMPTZ NOT NULL,
                activity_type TEXT NOT NULL,
                description   TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_activities_device_time ON activities (device_id, occurred_at DESC)",
        ],
    },
    Migration {
        entity: "remote_commands",
        depends_on: &["devices"],
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS remote_commands (
                id           TEXT PRIMARY KEY,
                device_id    TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                command_text TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'pending'
                             CHECK (status IN ('pending', 'running', 'completed', 'failed')),
                created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                started_at   TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                result       TEXT,
                exit_code    INTEGER
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_remote_commands_device_status ON remote_commands (device_id, status, created_at)",
        ],
    },
];

/// Applies [`MIGRATIONS`] in one transaction.
///
/// ## Safety
/// - Idempotent: safe to run on every startup
/// - Serialized across processes by an advisory lock
/// - All-or-nothing: a failing entity rolls back every entity before it
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    info!(entities = MIGRATIONS.len(), "Applying schema migrations");

    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    apply_schema(&mut *tx).await?;
    tx.commit().await?;

    info!("Schema migrations applied");
    Ok(())
}

/// Runs every statement on `conn` without committing.
///
/// Tests call this inside a transaction they roll back.
pub async fn apply_schema(conn: &mut PgConnection) -> DbResult<()> {
    for migration in MIGRATIONS {
        debug!(entity = migration.entity, "Migrating");
        for statement in migration.statements {
            sqlx::query(*statement)
                .execute(&mut *conn)
                .await
                .map_err(|e| DbError::MigrationFailed {
                    entity: migration.entity.to_string(),
                    message: e.to_string(),
                })?;
        }
    }
    Ok(())
}

/// Lists the tables [`MIGRATIONS`] creates that are absent from the
/// connected database.
pub async fn missing_tables(conn: &mut PgConnection) -> DbResult<Vec<String>> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT table_name::TEXT FROM information_schema.tables WHERE table_schema = current_schema()",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(MIGRATIONS
        .iter()
        .map(|m| m.entity)
        .filter(|entity| !present.iter().any(|t| t == entity))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_precede_dependents() {
        for (index, migration) in MIGRATIONS.iter().enumerate() {
            for dependency in migration.depends_on {
                let position = MIGRATIONS
                    .iter()
                    .position(|m| m.entity == *dependency)
                    .unwrap_or_else(|| panic!("{dependency} is not migrated"));
                assert!(
                    position < index,
                    "{} must come after {}",
                    migration.entity,
                    dependency
                );
            }
        }
    }

    #[test]
    fn test_entities_unique_and_devices_first() {
        assert_eq!(MIGRATIONS[0].entity, "devices");
        let mut names: Vec<_> = MIGRATIONS.iter().map(|m| m.entity).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), MIGRATIONS.len());
    }

    #[test]
    fn test_statements_are_idempotent() {
        for migration in MIGRATIONS {
            for statement in migration.statements {
                assert!(
                    statement.contains("IF NOT EXISTS"),
                    "{} has a non-idempotent statement",
                    migration.entity
                );
            }
        }
    }
}
