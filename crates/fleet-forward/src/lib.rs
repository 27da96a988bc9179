//! # fleet-forward: Edge → Central Forwarding
//!
//! Fire-and-forget relay of telemetry from the ingestion service to the
//! central service.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  device ──► ingest-api ──► local PostgreSQL   (authoritative, sync)    │
//! │                  │                                                      │
//! │                  └──► fleet-forward (THIS CRATE)    (best effort)       │
//! │                          │                                              │
//! │                          ▼                                              │
//! │                    central-api /api/{devices/register,metrics,...}     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A forwarding failure never touches the local write. There is no durable
//! outbox: a record that exhausts its retries, meets an open breaker, or
//! finds the queue full is logged, counted and lost to the central service.
//!
//! ## Modules
//!
//! - [`pipeline`] - [`ForwardingHandle`]: queue, workers, statistics
//! - [`relay`] - [`Relay`] seam and the reqwest-based [`HttpRelay`]
//! - [`record`] - [`ForwardRecord`]
//! - [`config`] - [`ForwardConfig`] (`CENTRAL_SERVICE_URL`)
//! - [`error`] - [`RelayError`], [`ForwardError`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! let forwarder = ForwardingHandle::from_config(&ForwardConfig::from_env()?)?;
//! if let Some(forwarder) = &forwarder {
//!     forwarder.submit(metric.clone());
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod relay;

pub use config::ForwardConfig;
pub use error::{ForwardError, ForwardResult, RelayError};
pub use pipeline::{ForwardStatsSnapshot, ForwardingHandle, SubmitOutcome};
pub use record::ForwardRecord;
pub use relay::{HttpRelay, Relay};
