//! # fleet-resilience: Retry and Circuit Breaking
//!
//! The reliability primitives behind every cross-service and
//! cross-dependency call in the fleet platform.
//!
//! ## How They Compose
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Database handshake (fleet-db)                                         │
//! │     retry_with_backoff(database preset)                                │
//! │        └── PgPoolOptions::connect_with(..)                             │
//! │                                                                         │
//! │  Edge → central forwarding (fleet-forward)                             │
//! │     retry_if(external_service preset, stop on Open / permanent)        │
//! │        └── CircuitBreaker::execute (one breaker per destination)       │
//! │              └── HTTP POST                                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`retry`] - [`retry_with_backoff`], [`retry_if`], [`retry_with_timeout`]
//! - [`circuit_breaker`] - [`CircuitBreaker`] state machine
//! - [`error`] - [`RetryError`] and [`BreakerError`]
//!
//! State is in-memory and per-process; nothing survives a restart.

pub mod circuit_breaker;
pub mod error;
pub mod retry;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{BreakerError, RetryError};
pub use retry::{retry_if, retry_with_backoff, retry_with_timeout, RetryConfig};

// Re-exported so callers do not need a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;
