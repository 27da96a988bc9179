//! # Circuit Breaker
//!
//! Three-state guard in front of one downstream dependency.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │             failures ≥ max_failures                                    │
//! │   ┌────────┐ ────────────────────────► ┌────────┐                      │
//! │   │ Closed │                           │  Open  │ ◄─────────┐          │
//! │   └────────┘ ◄──────┐                  └────────┘           │          │
//! │       ▲             │                      │                │ any      │
//! │       │ success     │ half_open_successes  │ now − last     │ failure  │
//! │       │ resets      │ ≥ max_half_open      │ failure ≥      │          │
//! │       │ failures    │                      │ timeout        │          │
//! │       └──┘          │                      ▼                │          │
//! │                     │                 ┌──────────┐          │          │
//! │                     └──────────────── │ HalfOpen │ ─────────┘          │
//! │                                       └──────────┘                     │
//! │                                  at most max_half_open                 │
//! │                                  probes admitted                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - A rejected call never invokes the operation ([`BreakerError::Open`]).
//! - `execute` never sleeps; rejection is immediate.
//! - All state lives behind one `std::sync::Mutex`, which is never held
//!   across an `.await`.
//! - Results are tagged with the generation (transition count) at which the
//!   call was admitted. A result that arrives after the breaker has moved on
//!   is ignored, so a slow call from a previous Closed period cannot count as
//!   a HalfOpen probe.
//! - A probe whose future is dropped before finishing records nothing and
//!   gives its HalfOpen slot back.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::BreakerError;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while Closed) that open the breaker.
    pub max_failures: u32,

    /// How long the breaker stays Open after the last failure.
    pub timeout: Duration,

    /// Probes admitted in HalfOpen, and successes needed to close.
    pub max_half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            max_failures: 5,
            timeout: Duration::from_secs(30),
            max_half_open_requests: 3,
        }
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Rejecting every call.
    Open,
    /// Letting a limited number of probes through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of a breaker, for health endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub half_open_requests: u32,
    pub half_open_successes: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    half_open_requests: u32,
    half_open_successes: u32,
    generation: u64,
}

impl Inner {
    fn new() -> Self {
        Inner {
            state: CircuitState::Closed,
            failures: 0,
            last_failure: None,
            half_open_requests: 0,
            half_open_successes: 0,
            generation: 0,
        }
    }

    fn transition(&mut self, name: &str, to: CircuitState) {
        let from = self.state;
        self.state = to;
        self.generation += 1;
        self.half_open_requests = 0;
        self.half_open_successes = 0;

        match to {
            CircuitState::Open => {
                warn!(breaker = name, %from, failures = self.failures, "Circuit breaker opened")
            }
            CircuitState::HalfOpen => {
                info!(breaker = name, %from, "Circuit breaker half-open, probing")
            }
            CircuitState::Closed => {
                self.failures = 0;
                info!(breaker = name, %from, "Circuit breaker closed")
            }
        }
    }
}

/// Admission granted by `allow_request`.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    generation: u64,
    probe: bool,
}

// =============================================================================
// Circuit Breaker
// =============================================================================

/// One breaker per protected dependency.
///
/// ## Usage
/// ```rust,ignore
/// let breaker = CircuitBreaker::new("central-api", CircuitBreakerConfig::default());
///
/// match breaker.execute(|| relay.send(&record)).await {
///     Ok(()) => {}
///     Err(BreakerError::Open { .. }) => { /* not attempted */ }
///     Err(BreakerError::Operation(e)) => { /* attempted, failed */ }
/// }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a Closed breaker. Zero thresholds are raised to 1.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let config = CircuitBreakerConfig {
            max_failures: config.max_failures.max(1),
            max_half_open_requests: config.max_half_open_requests.max(1),
            ..config
        };

        CircuitBreaker {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Runs `operation` if the breaker admits it.
    ///
    /// ## Returns
    /// * `Ok(T)` - operation succeeded
    /// * `Err(BreakerError::Open)` - rejected, `operation` was not called
    /// * `Err(BreakerError::Operation(e))` - operation ran and failed
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ticket = self.allow_request().ok_or_else(|| BreakerError::Open {
            name: self.name.clone(),
        })?;

        let mut guard = AbortGuard {
            breaker: self,
            ticket,
            armed: true,
        };
        let result = operation().await;
        guard.armed = false;

        self.record_result(ticket, result.is_ok());
        result.map_err(BreakerError::Operation)
    }

    /// Current state. An expired Open breaker still reports Open until the
    /// next call moves it to HalfOpen.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            half_open_requests: inner.half_open_requests,
            half_open_successes: inner.half_open_successes,
        }
    }

    /// Forces Closed with all counters zeroed.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            inner.transition(&self.name, CircuitState::Closed);
        } else {
            inner.failures = 0;
            inner.generation += 1;
        }
        inner.last_failure = None;
        info!(breaker = %self.name, "Circuit breaker reset");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allow_request(&self) -> Option<Ticket> {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Some(Ticket {
                generation: inner.generation,
                probe: false,
            }),
            CircuitState::Open => {
                let expired = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.timeout);
                if !expired {
                    return None;
                }
                inner.transition(&self.name, CircuitState::HalfOpen);
                inner.half_open_requests = 1;
                Some(Ticket {
                    generation: inner.generation,
                    probe: true,
                })
            }
            CircuitState::HalfOpen => {
                if inner.half_open_requests >= self.config.max_half_open_requests {
                    return None;
                }
                inner.half_open_requests += 1;
                Some(Ticket {
                    generation: inner.generation,
                    probe: true,
                })
            }
        }
    }

    fn record_result(&self, ticket: Ticket, success: bool) {
        let mut inner = self.lock();

        if ticket.generation != inner.generation {
            debug!(breaker = %self.name, success, "Ignoring result from a previous breaker state");
            return;
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.failures = 0,
            (CircuitState::Closed, false) => {
                inner.failures += 1;
                inner.last_failure = Some(Instant::now());
                if inner.failures >= self.config.max_failures {
                    inner.transition(&self.name, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.max_half_open_requests {
                    inner.transition(&self.name, CircuitState::Closed);
                }
            }
            (CircuitState::HalfOpen, false) => {
                inner.failures += 1;
                inner.last_failure = Some(Instant::now());
                inner.transition(&self.name, CircuitState::Open);
            }
            (CircuitState::Open, _) => {}
        }
    }

    fn release_probe(&self, ticket: Ticket) {
        let mut inner = self.lock();
        if ticket.generation == inner.generation && inner.state == CircuitState::HalfOpen {
            inner.half_open_requests = inner.half_open_requests.saturating_sub(1);
            debug!(breaker = %self.name, "Aborted probe released its slot");
        }
    }
}

/// Gives a HalfOpen slot back when `execute` is dropped mid-operation.
struct AbortGuard<'a> {
    breaker: &'a CircuitBreaker,
    ticket: Ticket,
    armed: bool,
}

impl Drop for AbortGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.ticket.probe {
            self.breaker.release_probe(self.ticket);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
