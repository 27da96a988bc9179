//! # Retry Executor
//!
//! Runs an async operation under a bounded exponential-backoff policy.
//!
//! ## Timeline (max_attempts = 4, initial = 1s, factor = 2, cap = 3s)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  attempt 1 ✗ ── sleep 1s ── attempt 2 ✗ ── sleep 2s ── attempt 3 ✗     │
//! │        ── sleep 3s (capped) ── attempt 4 ✗ ── Exhausted { attempts: 4 } │
//! │                                                                         │
//! │  • no sleep after the final attempt                                    │
//! │  • first Ok(..) returns immediately                                    │
//! │  • the cancellation token is watched during sleeps AND attempts;       │
//! │    an in-flight attempt is dropped when it fires                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Presets
//! | preset               | attempts | initial | cap  | used by                      |
//! |----------------------|----------|---------|------|------------------------------|
//! | `default_preset`     | 3        | 1s      | 30s  | general use                  |
//! | `database`           | 5        | 2s      | 30s  | connection handshake         |
//! | `external_service`   | 3        | 500ms   | 5s   | edge → central forwarding    |

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RetryError;

// =============================================================================
// Configuration
// =============================================================================

/// Backoff policy for one retry loop.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use fleet_resilience::RetryConfig;
///
/// let config = RetryConfig::database()
///     .max_attempts(8)
///     .initial_delay(Duration::from_secs(1));
/// assert_eq!(config.max_attempts, 8);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Growth factor applied after each failed attempt. Values below 1.0
    /// are treated as 1.0.
    pub backoff_factor: f64,
}

impl RetryConfig {
    /// General-purpose policy.
    pub fn default_preset() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }

    /// Tolerates slow database cold starts.
    pub fn database() -> Self {
        RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }

    /// Short delays for latency-sensitive, non-blocking callers.
    pub fn external_service() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Deterministic delay schedule (no jitter).
    fn schedule(&self) -> ExponentialBackoff {
        let multiplier = if self.backoff_factor.is_finite() {
            self.backoff_factor.max(1.0)
        } else {
            1.0
        };
        let max_interval = self.max_delay.max(self.initial_delay);

        let mut schedule = ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            randomization_factor: 0.0,
            multiplier,
            max_interval,
            max_elapsed_time: None,
            ..Default::default()
        };
        schedule.reset();
        schedule
    }

    /// The sleeps a fully failing loop performs, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let mut schedule = self.schedule();
        (1..self.attempts())
            .map(|_| schedule.next_backoff().unwrap_or(self.max_delay))
            .collect()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::default_preset()
    }
}

// =============================================================================
// Executors
// =============================================================================

/// Runs `operation` until it succeeds, the attempts run out, or `cancel`
/// fires. Every error is considered retryable.
///
/// ## Returns
/// * `Ok(T)` - first successful result
/// * `Err(RetryError::Exhausted)` - all `max_attempts` failed
/// * `Err(RetryError::Cancelled)` - token fired during a sleep or attempt
///
/// ## Example
/// ```rust,ignore
/// let token = CancellationToken::new();
/// let pool = retry_with_backoff(&token, &RetryConfig::database(), || {
///     PgPoolOptions::new().connect_with(options.clone())
/// })
/// .await?;
/// ```
pub async fn retry_with_backoff<T, E, F, Fut>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    retry_if(cancel, config, operation, |_| true).await
}

/// Like [`retry_with_backoff`], but stops with [`RetryError::Permanent`] as
/// soon as `should_retry` returns false for an error.
pub async fn retry_if<T, E, F, Fut, P>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    mut operation: F,
    mut should_retry: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = config.attempts();
    let mut schedule = config.schedule();
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempt, "Retry cancelled during attempt");
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            outcome = operation() => outcome,
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !should_retry(&err) {
            debug!(attempt, error = %err, "Non-retryable error, giving up");
            return Err(RetryError::Permanent {
                attempts: attempt,
                source: err,
            });
        }

        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %err, "Retry attempts exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: err,
            });
        }

        let delay = schedule.next_backoff().unwrap_or(config.max_delay);
        debug!(attempt, max_attempts, ?delay, error = %err, "Attempt failed, backing off");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempt, "Retry cancelled during backoff");
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Runs [`retry_with_backoff`] under an overall deadline.
///
/// When `timeout` passes, the in-flight attempt or sleep is dropped and
/// [`RetryError::DeadlineExceeded`] is returned.
pub async fn retry_with_timeout<T, E, F, Fut>(
    timeout: Duration,
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let cancel = CancellationToken::new();
    match tokio::time::timeout(timeout, retry_with_backoff(&cancel, config, operation)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(?timeout, "Retry deadline exceeded");
            Err(RetryError::DeadlineExceeded { timeout })
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    struct Boom(u32);

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom #{}", self.0)
        }
    }

    fn fast(attempts: u32) -> RetryConfig {
        RetryConfig::default_preset()
            .max_attempts(attempts)
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(100))
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryConfig::default().max_attempts, 3);
        assert_eq!(RetryConfig::database().max_attempts, 5);
        assert!(RetryConfig::database().initial_delay > RetryConfig::default().initial_delay);
        let external = RetryConfig::external_service();
        assert_eq!(external.max_attempts, 3);
        assert!(external.initial_delay < RetryConfig::default().initial_delay);
    }

    #[test]
    fn test_delay_schedule_is_capped() {
        let config = RetryConfig::default_preset()
            .max_attempts(6)
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(300));
        assert_eq!(
            config.delays(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ]
        );
        assert!(RetryConfig::default_preset().max_attempts(1).delays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_invoked_exactly_n_times() {
        for n in 1..=5 {
            let calls = AtomicU32::new(0);
            let token = CancellationToken::new();

            let result: Result<(), _> = retry_with_backoff(&token, &fast(n), || async {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(Boom(call))
            })
            .await;

            assert_eq!(calls.load(Ordering::SeqCst), n);
            match result {
                Err(RetryError::Exhausted { attempts, source }) => {
                    assert_eq!(attempts, n);
                    assert_eq!(source, Boom(n));
                }
                other => panic!("expected Exhausted, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_message_names_attempts() {
        let token = CancellationToken::new();
        let err = retry_with_backoff(&token, &fast(4), || async { Err::<(), _>(Boom(0)) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 4 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_attempt_k() {
        for k in 1..=4 {
            let calls = AtomicU32::new(0);
            let token = CancellationToken::new();

            let value = retry_with_backoff(&token, &fast(4), || async {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call < k {
                    Err(Boom(call))
                } else {
                    Ok(call * 10)
                }
            })
            .await
            .unwrap();

            assert_eq!(value, k * 10);
            assert_eq!(calls.load(Ordering::SeqCst), k);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_follow_schedule() {
        let config = RetryConfig::default_preset()
            .max_attempts(4)
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(250));
        let stamps = Mutex::new(Vec::new());
        let token = CancellationToken::new();

        let _ = retry_with_backoff(&token, &config, || async {
            stamps.lock().unwrap().push(Instant::now());
            Err::<(), _>(Boom(0))
        })
        .await;

        let stamps = stamps.into_inner().unwrap();
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(250),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_returns_promptly() {
        let config = RetryConfig::default_preset()
            .max_attempts(10)
            .initial_delay(Duration::from_secs(60));
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let task = {
            let token = token.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                retry_with_backoff(&token, &config, || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(Boom(0))
                    }
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        let cancelled_at = Instant::now();
        token.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Instant::now() - cancelled_at < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_in_flight_attempt() {
        let token = CancellationToken::new();
        let task = {
            let token = token.clone();
            tokio::spawn(async move {
                retry_with_backoff(&token, &fast(3), || async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, Boom>(())
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_invokes() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&token, &fast(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Boom>(())
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0 })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_if_stops_on_permanent_error() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_if(
            &token,
            &fast(5),
            || async {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(Boom(call))
            },
            |err| err.0 < 2,
        )
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Permanent { attempts: 2, source: Boom(2) })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_timeout_deadline() {
        let config = RetryConfig::default_preset()
            .max_attempts(100)
            .initial_delay(Duration::from_secs(1));

        let result = retry_with_timeout(Duration::from_secs(5), &config, || async {
            Err::<(), _>(Boom(0))
        })
        .await;

        match result {
            Err(RetryError::DeadlineExceeded { timeout }) => {
                assert_eq!(timeout, Duration::from_secs(5))
            }
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_timeout_success() {
        let value = retry_with_timeout(Duration::from_secs(5), &fast(3), || async {
            Ok::<_, Boom>("ready")
        })
        .await
        .unwrap();
        assert_eq!(value, "ready");
    }
}
