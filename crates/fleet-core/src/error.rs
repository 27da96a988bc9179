//! # Error Types
//!
//! Domain-specific error types for fleet-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  fleet-core errors (this file)                                         │
//! │  ├── CoreError        - Command state-machine violations               │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  fleet-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  HTTP errors (in apps)                                                 │
//! │  └── ApiError         - What clients see (serialized)                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CommandError → ApiError → Client  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::command::CommandStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule violations.
///
/// Nothing that produces one of these has been written anywhere: callers
/// reject the request and keep the stored state as it was.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A result was reported for a command that already finished.
    ///
    /// ## When This Occurs
    /// - Device retries its result POST after a timeout
    /// - Two agents on the same device report for the same command
    ///
    /// The stored terminal fields are left exactly as they were.
    #[error("Command {id} is already {status}, no further transitions allowed")]
    CommandAlreadyTerminal { id: String, status: CommandStatus },

    /// The requested status change is not a forward move.
    ///
    /// ## When This Occurs
    /// - `start` on a command that is already running
    /// - A report naming `pending` or `running` as the final status
    #[error("Command {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: CommandStatus,
        to: CommandStatus,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// True when the error is caused by the caller's input rather than by
    /// the stored state of a command.
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::Validation(_))
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: f64, max: f64 },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::CommandAlreadyTerminal {
            id: "cmd-1".to_string(),
            status: CommandStatus::Completed,
        };
        assert_eq!(
            err.to_string(),
            "Command cmd-1 is already completed, no further transitions allowed"
        );

        let err = CoreError::InvalidTransition {
            id: "cmd-2".to_string(),
            from: CommandStatus::Running,
            to: CommandStatus::Pending,
        };
        assert_eq!(err.to_string(), "Command cmd-2 cannot move from running to pending");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "device_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(core_err.is_validation());
        assert_eq!(core_err.to_string(), "Validation error: device_id is required");
    }
}
