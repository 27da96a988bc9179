//! # fleet-core: Domain Logic for the Fleet Platform
//!
//! Pure types and rules shared by the ingestion and central services.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Fleet Telemetry Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     fleet-core (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐   │   │
//! │  │   │  Telemetry  │    │  Commands   │    │   Validation    │   │   │
//! │  │   │  Device     │    │  status FSM │    │  ids, ranges    │   │   │
//! │  │   │  Metric ... │    │  allow-list │    │  allow-list     │   │   │
//! │  │   └─────────────┘    └─────────────┘    └─────────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                               │                                         │
//! │              ┌────────────────┴────────────────┐                       │
//! │              ▼                                 ▼                       │
//! │     fleet-db (persistence)          fleet-forward (edge → central)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Devices and append-only telemetry records
//! - [`command`] - Remote command state machine and allow-list
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use fleet_core::{CommandReport, RemoteCommand};
//!
//! let mut cmd = RemoteCommand::new("d1", "restart", Utc::now()).unwrap();
//! cmd.apply_report(&CommandReport::completed(0, "restarted"), Utc::now()).unwrap();
//! assert!(cmd.is_successful());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod command;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use command::{CommandKind, CommandReport, CommandStatus, RemoteCommand};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a device identifier.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Maximum length of names, messages and type labels.
pub const MAX_TEXT_LEN: usize = 1000;

/// Maximum size of the output a device may attach to a command report.
pub const MAX_COMMAND_RESULT_LEN: usize = 64 * 1024;
