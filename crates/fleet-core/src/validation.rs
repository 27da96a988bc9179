//! # Validation Module
//!
//! Input validation for everything that crosses a service boundary.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP route (axum)                                            │
//! │  └── Type validation (JSON deserialization)                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Identifiers, lengths, ranges                                      │
//! │  └── Command allow-list                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: PostgreSQL                                                   │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::command::CommandKind;
use crate::error::ValidationError;
use crate::{MAX_COMMAND_RESULT_LEN, MAX_DEVICE_ID_LEN, MAX_TEXT_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifiers
// =============================================================================

/// Validates a device identifier.
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - At most 128 characters
/// - Letters, digits, `-`, `_`, `.` and `:` only
///
/// ## Example
/// ```rust
/// use fleet_core::validation::validate_device_id;
///
/// assert!(validate_device_id("edge-01").is_ok());
/// assert!(validate_device_id("aa:bb:cc:dd:ee:ff").is_ok());
/// assert!(validate_device_id("").is_err());
/// assert!(validate_device_id("bad id").is_err());
/// ```
pub fn validate_device_id(device_id: &str) -> ValidationResult<()> {
    let device_id = device_id.trim();

    if device_id.is_empty() {
        return Err(ValidationError::Required {
            field: "device_id".to_string(),
        });
    }

    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "device_id".to_string(),
            max: MAX_DEVICE_ID_LEN,
        });
    }

    if !device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "device_id".to_string(),
            reason: "must contain only letters, numbers, '-', '_', '.' and ':'".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

/// Checks a command text against the allow-list.
///
/// ## Returns
/// The parsed [`CommandKind`].
///
/// ## Example
/// ```rust
/// use fleet_core::validation::validate_command_text;
/// use fleet_core::CommandKind;
///
/// assert_eq!(validate_command_text("get_logs").unwrap(), CommandKind::GetLogs);
/// assert!(validate_command_text("GET_LOGS").is_err());
/// ```
pub fn validate_command_text(command_text: &str) -> ValidationResult<CommandKind> {
    let command_text = command_text.trim();

    if command_text.is_empty() {
        return Err(ValidationError::Required {
            field: "command_text".to_string(),
        });
    }

    command_text.parse()
}

/// Bounds the size of device-reported command output.
pub fn validate_command_result(result: &str) -> ValidationResult<()> {
    if result.len() > MAX_COMMAND_RESULT_LEN {
        return Err(ValidationError::TooLong {
            field: "result".to_string(),
            max: MAX_COMMAND_RESULT_LEN,
        });
    }
    Ok(())
}

// =============================================================================
// Telemetry
// =============================================================================

/// Validates a usage percentage in `0.0..=100.0`.
pub fn validate_percentage(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0.0,
            max: 100.0,
        });
    }
    Ok(())
}

/// Validates a required free-text field (names, messages, types).
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - At most 1000 characters
pub fn validate_text(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
