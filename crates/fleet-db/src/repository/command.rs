//! # Remote Command Repository
//!
//! Persistence for [`RemoteCommand`] rows.
//!
//! ## Compare-and-Set Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  UPDATE remote_commands                                                │
//! │     SET status = $2, started_at = $3, ...                              │
//! │   WHERE id = $1 AND status = $7      ← status the caller last read     │
//! │                                                                         │
//! │  rows_affected = 1  → the transition won                               │
//! │  rows_affected = 0  → someone else moved the row first; re-read        │
//! │                                                                         │
//! │  Two concurrent reports for one command can therefore never both       │
//! │  succeed, and a terminal row is never overwritten.                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use fleet_core::{CommandStatus, RemoteCommand};

/// Storage seam for remote commands.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Persists a freshly created command.
    async fn insert(&self, command: &RemoteCommand) -> DbResult<()>;

    async fn get(&self, id: &str) -> DbResult<Option<RemoteCommand>>;

    /// Pending commands for a device, oldest first.
    async fn list_pending(&self, device_id: &str) -> DbResult<Vec<RemoteCommand>>;

    /// Commands for a device in any status, newest first.
    async fn list_for_device(&self, device_id: &str, limit: i64) -> DbResult<Vec<RemoteCommand>>;

    /// Writes the mutable fields of `command` only if the stored status is
    /// still `expected`. Returns whether the row was updated.
    async fn update_if_status(
        &self,
        command: &RemoteCommand,
        expected: CommandStatus,
    ) -> DbResult<bool>;
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
struct CommandRow {
    id: String,
    device_id: String,
    command_text: String,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<String>,
    exit_code: Option<i32>,
}

impl TryFrom<CommandRow> for RemoteCommand {
    type Error = DbError;

    fn try_from(row: CommandRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e| DbError::InvalidData {
            table: "remote_commands".to_string(),
            message: format!("row {}: {e}", row.id),
        })?;

        Ok(RemoteCommand {
            id: row.id,
            device_id: row.device_id,
            command_text: row.command_text,
            status,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            result: row.result,
            exit_code: row.exit_code,
        })
    }
}

fn into_commands(rows: Vec<CommandRow>) -> DbResult<Vec<RemoteCommand>> {
    rows.into_iter().map(RemoteCommand::try_from).collect()
}

const SELECT_COLUMNS: &str = "SELECT id, device_id, command_text, status, created_at, \
     started_at, completed_at, result, exit_code FROM remote_commands";

// =============================================================================
// Queries (usable inside a caller's transaction)
// =============================================================================

pub async fn insert(conn: &mut PgConnection, command: &RemoteCommand) -> DbResult<()> {
    debug!(command_id = %command.id, device_id = %command.device_id, "Inserting command");

    sqlx::query(
        r#"
        INSERT INTO remote_commands (
            id, device_id, command_text, status, created_at,
            started_at, completed_at, result, exit_code
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&command.id)
    .bind(&command.device_id)
    .bind(&command.command_text)
    .bind(command.status.as_str())
    .bind(command.created_at)
    .bind(command.started_at)
    .bind(command.completed_at)
    .bind(&command.result)
    .bind(command.exit_code)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get(conn: &mut PgConnection, id: &str) -> DbResult<Option<RemoteCommand>> {
    let row: Option<CommandRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;

    row.map(RemoteCommand::try_from).transpose()
}

pub async fn list_pending(conn: &mut PgConnection, device_id: &str) -> DbResult<Vec<RemoteCommand>> {
    let rows: Vec<CommandRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} WHERE device_id = $1 AND status = 'pending' ORDER BY created_at ASC, id ASC"
    ))
    .bind(device_id)
    .fetch_all(conn)
    .await?;

    into_commands(rows)
}

pub async fn list_for_device(
    conn: &mut PgConnection,
    device_id: &str,
    limit: i64,
) -> DbResult<Vec<RemoteCommand>> {
    let rows: Vec<CommandRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} WHERE device_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
    ))
    .bind(device_id)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    into_commands(rows)
}

pub async fn update_if_status(
    conn: &mut PgConnection,
    command: &RemoteCommand,
    expected: CommandStatus,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE remote_commands
           SET status = $2, started_at = $3, completed_at = $4, result = $5, exit_code = $6
         WHERE id = $1 AND status = $7
        "#,
    )
    .bind(&command.id)
    .bind(command.status.as_str())
    .bind(command.started_at)
    .bind(command.completed_at)
    .bind(&command.result)
    .bind(command.exit_code)
    .bind(expected.as_str())
    .execute(conn)
    .await?;

    let updated = result.rows_affected() == 1;
    debug!(
        command_id = %command.id,
        from = %expected,
        to = %command.status,
        updated,
        "Command status compare-and-set"
    );
    Ok(updated)
}

// =============================================================================
// Pool-backed Repository
// =============================================================================

/// [`CommandStore`] over a connection pool.
#[derive(Debug, Clone)]
pub struct PgCommandRepository {
    pool: PgPool,
}

impl PgCommandRepository {
    pub fn new(pool: PgPool) -> Self {
        PgCommandRepository { pool }
    }
}

#[async_trait]
impl CommandStore for PgCommandRepository {
    async fn insert(&self, command: &RemoteCommand) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, command).await
    }

    async fn get(&self, id: &str) -> DbResult<Option<RemoteCommand>> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, id).await
    }

    async fn list_pending(&self, device_id: &str) -> DbResult<Vec<RemoteCommand>> {
        let mut conn = self.pool.acquire().await?;
        list_pending(&mut conn, device_id).await
    }

    async fn list_for_device(&self, device_id: &str, limit: i64) -> DbResult<Vec<RemoteCommand>> {
        let mut conn = self.pool.acquire().await?;
        list_for_device(&mut conn, device_id, limit).await
    }

    async fn update_if_status(
        &self,
        command: &RemoteCommand,
        expected: CommandStatus,
    ) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        update_if_status(&mut conn, command, expected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> CommandRow {
        CommandRow {
            id: "c1".to_string(),
            device_id: "d1".to_string(),
            command_text: "restart".to_string(),
            status: status.to_string(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            exit_code: None,
        }
    }

    #[test]
    fn test_row_maps_to_command() {
        let command = RemoteCommand::try_from(row("running")).unwrap();
        assert_eq!(command.status, CommandStatus::Running);
        assert_eq!(command.device_id, "d1");
    }

    #[test]
    fn test_unknown_status_is_invalid_data() {
        match RemoteCommand::try_from(row("exploded")) {
            Err(DbError::InvalidData { table, message }) => {
                assert_eq!(table, "remote_commands");
                assert!(message.contains("c1"));
            }
            other => panic!("expected InvalidData, got {other:?}"),
        }
    }
}
