//! # fleet-central: Central Dashboard Service
//!
//! Receives telemetry forwarded by edge ingestion services and hands out
//! remote commands to polling devices.
//!
//! Storage is injected through [`AppState`]: PostgreSQL repositories in the
//! binary, in-memory stores in tests.

pub mod config;
pub mod error;
pub mod routes;

pub use config::CentralConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::{router, AppState, MAX_HISTORY_LIMIT};
