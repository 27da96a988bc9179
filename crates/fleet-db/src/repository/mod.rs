//! # Repository Module
//!
//! Storage traits and their PostgreSQL / in-memory implementations.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  HTTP handler / CommandLifecycle                                       │
//! │       │                                                                 │
//! │       │  Arc<dyn CommandStore>  /  Arc<dyn TelemetryStore>             │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────┐    ┌──────────────────────────┐          │
//! │  │ PgCommandRepository      │    │ MemoryCommandStore       │          │
//! │  │ PgTelemetryRepository    │    │ MemoryTelemetryStore     │          │
//! │  │  (sqlx, PgPool)          │    │  (tests, local dev)      │          │
//! │  └────────────┬─────────────┘    └──────────────────────────┘          │
//! │               │                                                         │
//! │               ▼                                                         │
//! │  free functions over `&mut PgConnection`                               │
//! │  (usable inside a caller's transaction)                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CommandStore`] - Remote command rows, compare-and-set status updates
//! - [`TelemetryStore`] - Devices, metrics, alerts, activities

pub mod command;
pub mod memory;
pub mod telemetry;

pub use command::{CommandStore, PgCommandRepository};
pub use memory::{MemoryCommandStore, MemoryTelemetryStore};
pub use telemetry::{PgTelemetryRepository, TelemetryStore};
