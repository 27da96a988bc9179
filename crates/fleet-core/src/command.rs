//! # Remote Commands
//!
//! The remote-command state machine shared by the central service (which
//! issues commands) and polling devices (which execute them).
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      RemoteCommand Lifecycle                            │
//! │                                                                         │
//! │   create (allow-listed text)                                           │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ┌─────────┐   start (optional)   ┌─────────┐                         │
//! │   │ pending │ ───────────────────► │ running │                         │
//! │   └────┬────┘                      └────┬────┘                         │
//! │        │ report                         │ report                       │
//! │        ▼                                ▼                              │
//! │   ┌───────────────────────────────────────────┐                        │
//! │   │    completed   |   failed   (terminal)    │                        │
//! │   └───────────────────────────────────────────┘                        │
//! │                                                                         │
//! │   Terminal states accept no further transitions.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is pure: timestamps are passed in by the caller, and
//! persistence lives in `fleet-db`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::validation::{validate_command_result, validate_command_text, validate_device_id};

// =============================================================================
// Command Status
// =============================================================================

/// Status of a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Created by the central service, not yet picked up.
    Pending,
    /// Device reported that execution started.
    Running,
    /// Device reported a finished execution.
    Completed,
    /// Device reported a failed execution.
    Failed,
}

impl CommandStatus {
    /// Database / wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Running => "running",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` are terminal.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }

    /// Whether `self → next` is a forward move.
    ///
    /// ```text
    /// pending → running | completed | failed
    /// running → completed | failed
    /// ```
    pub const fn can_transition_to(&self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (
                CommandStatus::Pending,
                CommandStatus::Running | CommandStatus::Completed | CommandStatus::Failed
            ) | (
                CommandStatus::Running,
                CommandStatus::Completed | CommandStatus::Failed
            )
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "running" => Ok(CommandStatus::Running),
            "completed" => Ok(CommandStatus::Completed),
            "failed" => Ok(CommandStatus::Failed),
            other => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown command status '{other}'"),
            }),
        }
    }
}

// =============================================================================
// Command Kind (allow-list)
// =============================================================================

/// The commands a device agent knows how to execute.
///
/// Anything outside this list is rejected before a row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    GetInfo,
    Status,
    Restart,
    GetProcesses,
    GetLogs,
    RestartService,
    Screenshot,
}

impl CommandKind {
    /// Every allowed command, in display order.
    pub const ALL: [CommandKind; 7] = [
        CommandKind::GetInfo,
        CommandKind::Status,
        CommandKind::Restart,
        CommandKind::GetProcesses,
        CommandKind::GetLogs,
        CommandKind::RestartService,
        CommandKind::Screenshot,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            CommandKind::GetInfo => "get_info",
            CommandKind::Status => "status",
            CommandKind::Restart => "restart",
            CommandKind::GetProcesses => "get_processes",
            CommandKind::GetLogs => "get_logs",
            CommandKind::RestartService => "restart_service",
            CommandKind::Screenshot => "screenshot",
        }
    }

    /// Allow-list as owned strings, for error messages.
    pub fn allowed() -> Vec<String> {
        Self::ALL.iter().map(|k| k.as_str().to_string()).collect()
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "command_text".to_string(),
                allowed: Self::allowed(),
            })
    }
}

// =============================================================================
// Remote Command
// =============================================================================

/// A command issued by the central service to one device.
///
/// `device_id` and `command_text` never change after creation; the
/// remaining fields are filled in by the device as it progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommand {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub device_id: String,
    pub command_text: String,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-text output captured by the device.
    pub result: Option<String>,
    pub exit_code: Option<i32>,
}

impl RemoteCommand {
    /// Creates a validated `pending` command.
    ///
    /// ## Errors
    /// * `ValidationError::Required` - empty device id
    /// * `ValidationError::NotAllowed` - command text outside the allow-list
    ///
    /// ## Example
    /// ```rust
    /// use chrono::Utc;
    /// use fleet_core::{CommandStatus, RemoteCommand};
    ///
    /// let cmd = RemoteCommand::new("d1", "restart", Utc::now()).unwrap();
    /// assert_eq!(cmd.status, CommandStatus::Pending);
    /// assert!(RemoteCommand::new("d1", "rm -rf /", Utc::now()).is_err());
    /// ```
    pub fn new(device_id: &str, command_text: &str, now: DateTime<Utc>) -> CoreResult<Self> {
        validate_device_id(device_id)?;
        let kind = validate_command_text(command_text)?;

        Ok(RemoteCommand {
            id: Uuid::new_v4().to_string(),
            device_id: device_id.trim().to_string(),
            command_text: kind.as_str().to_string(),
            status: CommandStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            exit_code: None,
        })
    }

    /// Parsed command kind. `None` only for rows written outside this crate.
    pub fn kind(&self) -> Option<CommandKind> {
        self.command_text.parse().ok()
    }

    /// Moves a pending command to `running`.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.check_transition(CommandStatus::Running)?;
        self.status = CommandStatus::Running;
        self.started_at = Some(now);
        Ok(())
    }

    /// Applies a device's terminal report and stamps `completed_at`.
    ///
    /// On error the command is left untouched.
    pub fn apply_report(&mut self, report: &CommandReport, now: DateTime<Utc>) -> CoreResult<()> {
        report.validate()?;
        self.check_transition(report.status)?;

        self.status = report.status;
        self.result = report.result.clone();
        self.exit_code = report.exit_code;
        self.completed_at = Some(now);
        Ok(())
    }

    fn check_transition(&self, next: CommandStatus) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::CommandAlreadyTerminal {
                id: self.id.clone(),
                status: self.status,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        Ok(())
    }

    /// The device has finished with this command, successfully or not.
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Finished, reported `completed`, and exited with code 0.
    pub fn is_successful(&self) -> bool {
        self.status == CommandStatus::Completed && self.exit_code == Some(0)
    }
}

// =============================================================================
// Command Report
// =============================================================================

/// Terminal result reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReport {
    pub status: CommandStatus,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl CommandReport {
    pub fn completed(exit_code: i32, result: impl Into<String>) -> Self {
        CommandReport {
            status: CommandStatus::Completed,
            result: Some(result.into()),
            exit_code: Some(exit_code),
        }
    }

    pub fn failed(exit_code: Option<i32>, result: impl Into<String>) -> Self {
        CommandReport {
            status: CommandStatus::Failed,
            result: Some(result.into()),
            exit_code,
        }
    }

    /// A report must name a terminal status.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.status.is_terminal() {
            return Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: vec![
                    CommandStatus::Completed.to_string(),
                    CommandStatus::Failed.to_string(),
                ],
            });
        }
        if let Some(result) = &self.result {
            validate_command_result(result)?;
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_status_round_trip_and_terminal() {
        for status in [
            CommandStatus::Pending,
            CommandStatus::Running,
            CommandStatus::Completed,
            CommandStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<CommandStatus>().unwrap(), status);
        }
        assert!(!CommandStatus::Pending.is_terminal());
        assert!(!CommandStatus::Running.is_terminal());
        assert!(CommandStatus::Completed.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
        assert!("done".parse::<CommandStatus>().is_err());
    }

    #[test]
    fn test_transitions_only_move_forward() {
        use CommandStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Running.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_allow_list() {
        for kind in CommandKind::ALL {
            assert_eq!(kind.as_str().parse::<CommandKind>().unwrap(), kind);
        }
        let err = "format_disk".parse::<CommandKind>().unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { ref field, .. } if field == "command_text"));
    }

    #[test]
    fn test_new_command_is_pending() {
        let cmd = RemoteCommand::new("d1", "restart", now()).unwrap();
        assert_eq!(cmd.status, CommandStatus::Pending);
        assert_eq!(cmd.device_id, "d1");
        assert_eq!(cmd.kind(), Some(CommandKind::Restart));
        assert!(cmd.completed_at.is_none());
        assert!(!cmd.is_completed());
    }

    #[test]
    fn test_new_command_rejects_bad_input() {
        assert!(RemoteCommand::new("", "restart", now()).is_err());
        assert!(RemoteCommand::new("   ", "status", now()).is_err());
        assert!(RemoteCommand::new("d1", "shutdown -h now", now()).is_err());
    }

    #[test]
    fn test_report_then_second_report_rejected() {
        let mut cmd = RemoteCommand::new("d1", "restart", now()).unwrap();
        cmd.apply_report(&CommandReport::completed(0, "ok"), now()).unwrap();
        assert!(cmd.is_completed());
        assert!(cmd.is_successful());

        let before = cmd.clone();
        let err = cmd
            .apply_report(&CommandReport::failed(Some(1), "boom"), now())
            .unwrap_err();
        assert!(matches!(err, CoreError::CommandAlreadyTerminal { .. }));
        assert_eq!(cmd, before);
        assert!(cmd.is_successful());
    }

    #[test]
    fn test_nonzero_exit_is_not_successful() {
        let mut cmd = RemoteCommand::new("d1", "get_logs", now()).unwrap();
        cmd.apply_report(&CommandReport::completed(2, "partial"), now()).unwrap();
        assert!(cmd.is_completed());
        assert!(!cmd.is_successful());
    }

    #[test]
    fn test_report_must_be_terminal() {
        let mut cmd = RemoteCommand::new("d1", "status", now()).unwrap();
        let report = CommandReport {
            status: CommandStatus::Running,
            result: None,
            exit_code: None,
        };
        assert!(cmd.apply_report(&report, now()).is_err());
        assert_eq!(cmd.status, CommandStatus::Pending);
    }

    #[test]
    fn test_mark_running() {
        let mut cmd = RemoteCommand::new("d1", "get_processes", now()).unwrap();
        cmd.mark_running(now()).unwrap();
        assert_eq!(cmd.status, CommandStatus::Running);
        assert!(cmd.started_at.is_some());

        let err = cmd.mark_running(now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));

        cmd.apply_report(&CommandReport::failed(None, "crashed"), now()).unwrap();
        assert_eq!(cmd.status, CommandStatus::Failed);
        assert!(!cmd.is_successful());
    }
}
