//! # Forwarding Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  RelayError           one HTTP attempt                                 │
//! │    Transport ─┐                                                         │
//! │    Status ────┴── retryable (5xx, 429, network)                        │
//! │    Rejected ───── permanent (other 4xx)                                │
//! │    Serialization  permanent                                            │
//! │       │                                                                 │
//! │       ▼  wrapped by CircuitBreaker::execute, then retry_if             │
//! │                                                                         │
//! │  ForwardError         terminal outcome of one record                   │
//! │    CircuitOpen / Exhausted / Rejected / Cancelled                      │
//! │    (logged and counted, never returned to the ingesting client)        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use fleet_resilience::{BreakerError, RetryError};
use thiserror::Error;

/// Failure of a single relay attempt.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection refused, DNS failure, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// Destination answered with a server error or asked us to back off.
    #[error("destination returned HTTP {code}")]
    Status { code: u16 },

    /// Destination refused the payload; resending it cannot help.
    #[error("destination rejected the record with HTTP {code}")]
    Rejected { code: u16 },

    #[error("could not encode record: {0}")]
    Serialization(String),
}

impl RelayError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Transport(_) | RelayError::Status { .. })
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(code: u16) -> Self {
        if code == 429 || (500..600).contains(&code) {
            RelayError::Status { code }
        } else {
            RelayError::Rejected { code }
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() || err.is_decode() {
            RelayError::Serialization(err.to_string())
        } else {
            RelayError::Transport(err.to_string())
        }
    }
}

/// Why a record was not delivered.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Forwarding settings are malformed.
    #[error("Invalid forwarding configuration for {key}: '{value}'")]
    InvalidConfig { key: String, value: String },

    /// The breaker was open; the destination was not contacted.
    #[error("circuit to {destination} is open, record not sent")]
    CircuitOpen { destination: String },

    /// Every retry failed with a retryable error.
    #[error("gave up after {attempts} attempt(s): {source}")]
    Exhausted { attempts: u32, source: RelayError },

    /// The destination refused the record.
    #[error("not retried: {0}")]
    Rejected(RelayError),

    /// Shutdown grace period ran out mid-delivery.
    #[error("delivery cancelled by shutdown")]
    Cancelled,
}

impl ForwardError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ForwardError::CircuitOpen { .. })
    }
}

impl From<RetryError<BreakerError<RelayError>>> for ForwardError {
    fn from(err: RetryError<BreakerError<RelayError>>) -> Self {
        match err {
            RetryError::Exhausted { source: BreakerError::Open { name }, .. }
            | RetryError::Permanent { source: BreakerError::Open { name }, .. } => {
                ForwardError::CircuitOpen { destination: name }
            }
            RetryError::Exhausted {
                attempts,
                source: BreakerError::Operation(source),
            } => ForwardError::Exhausted { attempts, source },
            RetryError::Permanent {
                source: BreakerError::Operation(source),
                ..
            } => ForwardError::Rejected(source),
            RetryError::Cancelled { .. } | RetryError::DeadlineExceeded { .. } => {
                ForwardError::Cancelled
            }
        }
    }
}

pub type ForwardResult<T> = Result<T, ForwardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(RelayError::from_status(503).is_retryable());
        assert!(RelayError::from_status(500).is_retryable());
        assert!(RelayError::from_status(429).is_retryable());
        assert!(!RelayError::from_status(400).is_retryable());
        assert!(!RelayError::from_status(404).is_retryable());
        assert!(RelayError::Transport("refused".into()).is_retryable());
        assert!(!RelayError::Serialization("bad".into()).is_retryable());
    }

    #[test]
    fn test_open_rejection_maps_to_circuit_open() {
        let err: RetryError<BreakerError<RelayError>> = RetryError::Permanent {
            attempts: 1,
            source: BreakerError::Open {
                name: "central".to_string(),
            },
        };
        let forward = ForwardError::from(err);
        assert!(forward.is_circuit_open());
        assert_eq!(forward.to_string(), "circuit to central is open, record not sent");
    }

    #[test]
    fn test_exhaustion_keeps_last_relay_error() {
        let err = RetryError::Exhausted {
            attempts: 3,
            source: BreakerError::Operation(RelayError::Status { code: 503 }),
        };
        match ForwardError::from(err) {
            ForwardError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, RelayError::Status { code: 503 }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
