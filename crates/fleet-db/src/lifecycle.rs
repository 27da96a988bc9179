//! # Command Lifecycle
//!
//! Orchestrates remote commands on top of a [`CommandStore`].
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create()                start()               report_result()        │
//! │  ─────────► pending ───────────────► running ─────────────► completed  │
//! │                │                                       └──► failed     │
//! │                └──────────── report_result() ─────────────┘            │
//! │                                                                         │
//! │  completed / failed are terminal: later reports are rejected and the   │
//! │  stored outcome is kept.                                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! Every transition is read → apply in memory → compare-and-set on the
//! status that was read. A CAS miss means another writer moved the command;
//! the loop re-reads and re-validates against the new status.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::DbError;
use crate::repository::CommandStore;
use fleet_core::validation::validate_device_id;
use fleet_core::{CommandReport, CoreError, CoreResult, RemoteCommand};

/// How often a transition re-reads after losing a compare-and-set race.
const MAX_TRANSITION_ATTEMPTS: u32 = 3;

/// Errors from command lifecycle operations.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Input or transition refused by the domain rules.
    ///
    /// ## When This Occurs
    /// - Command text outside the allow-list
    /// - Report for a command that already finished
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// The device was never registered with this service.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Command not found: {0}")]
    NotFound(String),

    /// Lost every compare-and-set attempt to concurrent writers.
    #[error("Command {0} was modified concurrently, retry the request")]
    Conflict(String),

    #[error(transparent)]
    Storage(#[from] DbError),
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Remote command operations for the central service.
#[derive(Clone)]
pub struct CommandLifecycle {
    store: Arc<dyn CommandStore>,
}

impl CommandLifecycle {
    pub fn new(store: Arc<dyn CommandStore>) -> Self {
        CommandLifecycle { store }
    }

    /// Validates and stores a new `pending` command.
    ///
    /// Nothing is written when validation fails.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let cmd = lifecycle.create("d1", "restart").await?;
    /// assert_eq!(cmd.status, CommandStatus::Pending);
    /// ```
    pub async fn create(&self, device_id: &str, command_text: &str) -> CommandResult<RemoteCommand> {
        let command = RemoteCommand::new(device_id, command_text, Utc::now())?;

        self.store.insert(&command).await.map_err(|e| match e {
            DbError::ForeignKeyViolation { .. } => CommandError::UnknownDevice(command.device_id.clone()),
            other => CommandError::Storage(other),
        })?;

        info!(
            command_id = %command.id,
            device_id = %command.device_id,
            command = %command.command_text,
            "Command created"
        );
        Ok(command)
    }

    /// Pending commands for a device, oldest first.
    pub async fn poll_pending(&self, device_id: &str) -> CommandResult<Vec<RemoteCommand>> {
        validate_device_id(device_id).map_err(CoreError::from)?;
        let pending = self.store.list_pending(device_id.trim()).await?;
        debug!(device_id, count = pending.len(), "Polled pending commands");
        Ok(pending)
    }

    pub async fn get(&self, id: &str) -> CommandResult<RemoteCommand> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CommandError::NotFound(id.to_string()))
    }

    /// Command history for a device, newest first.
    pub async fn list_for_device(&self, device_id: &str, limit: i64) -> CommandResult<Vec<RemoteCommand>> {
        validate_device_id(device_id).map_err(CoreError::from)?;
        Ok(self.store.list_for_device(device_id.trim(), limit.max(0)).await?)
    }

    /// Device picked the command up: `pending → running`.
    pub async fn start(&self, id: &str) -> CommandResult<RemoteCommand> {
        let command = self.transition(id, |cmd| cmd.mark_running(Utc::now())).await?;
        info!(command_id = %id, device_id = %command.device_id, "Command running");
        Ok(command)
    }

    /// Records a device's terminal report.
    ///
    /// ## Errors
    /// * `CommandError::Rejected` - command already completed or failed; the
    ///   stored outcome is unchanged
    /// * `CommandError::NotFound` - unknown command id
    pub async fn report_result(&self, id: &str, report: &CommandReport) -> CommandResult<RemoteCommand> {
        let command = self
            .transition(id, |cmd| cmd.apply_report(report, Utc::now()))
            .await?;

        info!(
            command_id = %id,
            device_id = %command.device_id,
            status = %command.status,
            exit_code = ?command.exit_code,
            "Command finished"
        );
        Ok(command)
    }

    async fn transition<F>(&self, id: &str, mut apply: F) -> CommandResult<RemoteCommand>
    where
        F: FnMut(&mut RemoteCommand) -> CoreResult<()>,
    {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let mut command = self.get(id).await?;
            let expected = command.status;

            apply(&mut command)?;

            if self.store.update_if_status(&command, expected).await? {
                return Ok(command);
            }

            warn!(command_id = %id, attempt, from = %expected, "Command changed concurrently, re-reading");
        }

        Err(CommandError::Conflict(id.to_string()))
    }
}

impl std::fmt::Debug for CommandLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLifecycle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbResult;
    use crate::repository::MemoryCommandStore;
    use async_trait::async_trait;
    use fleet_core::CommandStatus;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn lifecycle() -> (CommandLifecycle, Arc<MemoryCommandStore>) {
        let store = Arc::new(MemoryCommandStore::with_devices(["d1"]));
        (CommandLifecycle::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_create_report_and_reject_second_report() {
        let (lifecycle, _) = lifecycle();

        let cmd = lifecycle.create("d1", "restart").await.unwrap();
        assert_eq!(cmd.status, CommandStatus::Pending);
        assert_eq!(lifecycle.poll_pending("d1").await.unwrap().len(), 1);

        let done = lifecycle
            .report_result(&cmd.id, &CommandReport::completed(0, "ok"))
            .await
            .unwrap();
        assert!(done.is_successful());
        assert!(done.completed_at.is_some());

        let second = lifecycle
            .report_result(&cmd.id, &CommandReport::failed(Some(1), "late"))
            .await;
        assert!(matches!(
            second,
            Err(CommandError::Rejected(CoreError::CommandAlreadyTerminal { .. }))
        ));

        let stored = lifecycle.get(&cmd.id).await.unwrap();
        assert!(stored.is_successful());
        assert_eq!(stored.result.as_deref(), Some("ok"));
        assert!(lifecycle.poll_pending("d1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disallowed_command_is_not_persisted() {
        let (lifecycle, store) = lifecycle();
        let result = lifecycle.create("d1", "rm -rf /").await;
        match result {
            Err(CommandError::Rejected(e)) => assert!(e.is_validation()),
            other => panic!("expected validation rejection, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_start_then_fail() {
        let (lifecycle, _) = lifecycle();
        let cmd = lifecycle.create("d1", "status").await.unwrap();

        let running = lifecycle.start(&cmd.id).await.unwrap();
        assert_eq!(running.status, CommandStatus::Running);
        assert!(running.started_at.is_some());

        // Starting twice is not a forward move.
        assert!(matches!(
            lifecycle.start(&cmd.id).await,
            Err(CommandError::Rejected(CoreError::InvalidTransition { .. }))
        ));

        let failed = lifecycle
            .report_result(&cmd.id, &CommandReport::failed(Some(2), "denied"))
            .await
            .unwrap();
        assert!(failed.is_completed());
        assert!(!failed.is_successful());
    }

    #[tokio::test]
    async fn test_unknown_command_and_invalid_device() {
        let (lifecycle, _) = lifecycle();
        assert!(matches!(
            lifecycle.start("nope").await,
            Err(CommandError::NotFound(_))
        ));
        assert!(matches!(
            lifecycle.poll_pending("").await,
            Err(CommandError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_unregistered_device_is_unknown() {
        let (lifecycle, store) = lifecycle();
        let result = lifecycle.create("never-registered", "restart").await;
        assert!(matches!(result, Err(CommandError::UnknownDevice(ref id)) if id == "never-registered"));
        assert!(store.is_empty());
    }

    /// Lets another writer finish the command between our read and our CAS.
    struct RacingStore {
        inner: MemoryCommandStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl CommandStore for RacingStore {
        async fn insert(&self, command: &RemoteCommand) -> DbResult<()> {
            self.inner.insert(command).await
        }

        async fn get(&self, id: &str) -> DbResult<Option<RemoteCommand>> {
            self.inner.get(id).await
        }

        async fn list_pending(&self, device_id: &str) -> DbResult<Vec<RemoteCommand>> {
            self.inner.list_pending(device_id).await
        }

        async fn list_for_device(&self, device_id: &str, limit: i64) -> DbResult<Vec<RemoteCommand>> {
            self.inner.list_for_device(device_id, limit).await
        }

        async fn update_if_status(
            &self,
            command: &RemoteCommand,
            expected: CommandStatus,
        ) -> DbResult<bool> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let mut rival = self.inner.get(&command.id).await?.unwrap();
                rival.apply_report(&CommandReport::completed(0, "rival"), Utc::now()).unwrap();
                assert!(self.inner.update_if_status(&rival, expected).await?);
            }
            self.inner.update_if_status(command, expected).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_report_loses_and_is_rejected() {
        let store = Arc::new(RacingStore {
            inner: MemoryCommandStore::with_devices(["d1"]),
            raced: AtomicBool::new(false),
        });
        let lifecycle = CommandLifecycle::new(store.clone());
        let cmd = lifecycle.create("d1", "restart").await.unwrap();

        let ours = lifecycle
            .report_result(&cmd.id, &CommandReport::failed(Some(1), "ours"))
            .await;
        assert!(matches!(
            ours,
            Err(CommandError::Rejected(CoreError::CommandAlreadyTerminal { .. }))
        ));

        let stored = lifecycle.get(&cmd.id).await.unwrap();
        assert_eq!(stored.result.as_deref(), Some("rival"));
        assert!(stored.is_successful());
    }
}
