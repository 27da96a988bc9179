//! # fleet-ingest: Edge Ingestion Service
//!
//! Stores device telemetry locally and relays it to the central service.
//!
//! ## Request Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  device ── POST /api/metrics ──► routes ──► IngestService              │
//! │                                               │                         │
//! │                           1. validate         │  400 on failure         │
//! │                           2. TelemetryStore   │  500/503 on failure     │
//! │                           3. forwarder.submit │  never fails            │
//! │                                               ▼                         │
//! │                                  201 { stored, forward }               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The binary in `main.rs` wires configuration, the connection manager and
//! the forwarding pipeline; everything else lives here so it can be tested
//! without a socket.

pub mod config;
pub mod error;
pub mod routes;
pub mod service;

pub use config::IngestConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::{router, AppState};
pub use service::{ForwardStatus, IngestService, Receipt};
