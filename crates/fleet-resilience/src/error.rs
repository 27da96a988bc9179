//! # Resilience Error Types
//!
//! Both wrappers are generic over the error of the wrapped operation, so the
//! caller always gets its own error back inside the wrapper's verdict.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  RetryError<E>                        BreakerError<E>                   │
//! │  ├── Exhausted  - attempted n times   ├── Open      - NOT attempted     │
//! │  ├── Permanent  - gave up early       └── Operation - attempted, failed │
//! │  ├── Cancelled  - token fired                                          │
//! │  └── DeadlineExceeded                                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Retry Error
// =============================================================================

/// Failure of a [`retry_with_backoff`](crate::retry_with_backoff) loop.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed. `source` is the last failure.
    #[error("operation failed after {attempts} attempt(s): {source}")]
    Exhausted { attempts: u32, source: E },

    /// The retry predicate classified the error as not worth retrying.
    #[error("operation failed with a non-retryable error on attempt {attempts}: {source}")]
    Permanent { attempts: u32, source: E },

    /// The cancellation token fired during a sleep or an in-flight attempt.
    #[error("retry cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// The overall deadline of [`retry_with_timeout`](crate::retry_with_timeout) passed.
    #[error("retry deadline of {timeout:?} exceeded")]
    DeadlineExceeded { timeout: Duration },
}

impl<E> RetryError<E> {
    /// The last error returned by the operation, if it ran at all.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Permanent { source, .. } => {
                Some(source)
            }
            RetryError::Cancelled { .. } | RetryError::DeadlineExceeded { .. } => None,
        }
    }

    /// Consumes the error, returning the operation's last error if any.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Permanent { source, .. } => {
                Some(source)
            }
            RetryError::Cancelled { .. } | RetryError::DeadlineExceeded { .. } => None,
        }
    }

    /// True for cancellation and deadline expiry.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            RetryError::Cancelled { .. } | RetryError::DeadlineExceeded { .. }
        )
    }
}

// =============================================================================
// Breaker Error
// =============================================================================

/// Failure of a [`CircuitBreaker::execute`](crate::CircuitBreaker::execute) call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call; the operation was never invoked.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    /// The operation ran and failed.
    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The operation's error, `None` for a rejection.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}
