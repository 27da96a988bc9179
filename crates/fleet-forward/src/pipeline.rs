//! # Forwarding Pipeline
//!
//! Relays records the ingestion service has already persisted, off the
//! request path.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Forwarding Pipeline                                │
//! │                                                                         │
//! │  HTTP handler (record already committed locally)                       │
//! │       │                                                                 │
//! │       │  handle.submit(record)   try_send, never waits                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  bounded mpsc queue (queue_capacity)      full → drop + count   │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │            ┌──────────────────┼──────────────────┐                     │
//! │            ▼                  ▼                  ▼                     │
//! │        worker 0           worker 1    ...    worker N-1                │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  retry_if(external_service preset)                                     │
//! │     └── CircuitBreaker::execute        (one breaker, shared)           │
//! │            └── Relay::send             (one HTTP POST)                 │
//! │                                                                         │
//! │  Open breaker or 4xx → stop at once; 5xx / network → back off, retry   │
//! │  Terminal failure → warn! + counter, never back to the client          │
//! │                                                                         │
//! │  shutdown(grace): close queue → workers drain → after grace, cancel    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fleet_resilience::{
    retry_if, BreakerError, BreakerSnapshot, CancellationToken, CircuitBreaker, RetryConfig,
};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ForwardConfig;
use crate::error::{ForwardError, ForwardResult, RelayError};
use crate::record::ForwardRecord;
use crate::relay::{HttpRelay, Relay};

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct ForwardStats {
    queued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    rejected_open: AtomicU64,
}

/// Point-in-time delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForwardStatsSnapshot {
    /// Accepted onto the queue.
    pub queued: u64,
    /// Refused because the queue was full.
    pub dropped: u64,
    pub delivered: u64,
    /// Gave up after retries, refused by the destination, or cancelled.
    pub failed: u64,
    /// Not attempted because the breaker was open.
    pub rejected_open: u64,
}

impl ForwardStats {
    fn snapshot(&self) -> ForwardStatsSnapshot {
        ForwardStatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected_open: self.rejected_open.load(Ordering::Relaxed),
        }
    }
}

/// What happened to a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// Queue full; the record is only in local storage.
    Dropped,
    /// Pipeline already shut down.
    Closed,
}

// =============================================================================
// Delivery
// =============================================================================

/// Everything a worker needs to deliver one record.
struct Delivery {
    relay: Arc<dyn Relay>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
    stats: ForwardStats,
    cancel: CancellationToken,
}

impl Delivery {
    async fn deliver(&self, record: &ForwardRecord) -> ForwardResult<()> {
        let outcome = retry_if(
            &self.cancel,
            &self.retry,
            || self.breaker.execute(|| self.relay.send(record)),
            |err: &BreakerError<RelayError>| match err {
                BreakerError::Open { .. } => false,
                BreakerError::Operation(e) => e.is_retryable(),
            },
        )
        .await;

        outcome.map_err(ForwardError::from)
    }

    async fn process(&self, record: ForwardRecord) {
        let operation = record.kind();
        let record_id = record.record_id();
        let span = info_span!("forward", operation, record_id = %record_id);

        match self.deliver(&record).instrument(span).await {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(operation, record_id = %record_id, "Record forwarded");
            }
            Err(e) if e.is_circuit_open() => {
                self.stats.rejected_open.fetch_add(1, Ordering::Relaxed);
                warn!(operation, record_id = %record_id, error = %e, "Forward skipped, circuit open");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(operation, record_id = %record_id, error = %e, "Forward failed");
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<ForwardRecord>>>,
    delivery: Arc<Delivery>,
) {
    debug!(worker, "Forward worker started");

    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = delivery.cancel.cancelled() => None,
                record = queue.recv() => record,
            }
        };

        match next {
            Some(record) => delivery.process(record).await,
            None => break,
        }
    }

    debug!(worker, "Forward worker stopped");
}

// =============================================================================
// Handle
// =============================================================================

struct Shared {
    sender: Mutex<Option<mpsc::Sender<ForwardRecord>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    delivery: Arc<Delivery>,
}

/// Cloneable entry point to a running pipeline.
#[derive(Clone)]
pub struct ForwardingHandle {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ForwardingHandle {
    /// Starts the pipeline when a central URL is configured.
    ///
    /// Returns `Ok(None)` when forwarding is disabled; no breaker, retry or
    /// worker exists in that case.
    pub fn from_config(config: &ForwardConfig) -> ForwardResult<Option<Self>> {
        let Some(raw_url) = config.central_url.as_deref() else {
            info!("CENTRAL_SERVICE_URL not set, forwarding disabled");
            return Ok(None);
        };

        let relay = HttpRelay::new(config.central_base_url(raw_url)?, config.request_timeout())?;
        Ok(Some(Self::spawn(config, Arc::new(relay))))
    }

    /// Starts `config.workers` workers delivering through `relay`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(config: &ForwardConfig, relay: Arc<dyn Relay>) -> Self {
        let capacity = config.queue_capacity.max(1);
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Arc::new(tokio::sync::Mutex::new(rx));

        let delivery = Arc::new(Delivery {
            breaker: CircuitBreaker::new(relay.destination(), config.breaker_config()),
            relay,
            retry: config.retry.clone(),
            stats: ForwardStats::default(),
            cancel: CancellationToken::new(),
        });

        let handles = (0..workers)
            .map(|worker| tokio::spawn(run_worker(worker, queue.clone(), delivery.clone())))
            .collect();

        info!(
            destination = delivery.breaker.name(),
            workers,
            capacity,
            "Forwarding pipeline started"
        );

        ForwardingHandle {
            shared: Arc::new(Shared {
                sender: Mutex::new(Some(tx)),
                workers: Mutex::new(handles),
                delivery,
            }),
        }
    }

    /// Enqueues a record without waiting. Never fails the caller.
    pub fn submit(&self, record: impl Into<ForwardRecord>) -> SubmitOutcome {
        let record = record.into();
        let stats = &self.shared.delivery.stats;
        let sender = lock(&self.shared.sender);

        let Some(tx) = sender.as_ref() else {
            debug!(operation = record.kind(), "Forwarding closed, record not queued");
            return SubmitOutcome::Closed;
        };

        match tx.try_send(record) {
            Ok(()) => {
                stats.queued.fetch_add(1, Ordering::Relaxed);
                SubmitOutcome::Queued
            }
            Err(TrySendError::Full(record)) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    operation = record.kind(),
                    record_id = %record.record_id(),
                    "Forward queue full, record dropped"
                );
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => SubmitOutcome::Closed,
        }
    }

    pub fn destination(&self) -> &str {
        self.shared.delivery.breaker.name()
    }

    pub fn stats(&self) -> ForwardStatsSnapshot {
        self.shared.delivery.stats.snapshot()
    }

    pub fn breaker(&self) -> BreakerSnapshot {
        self.shared.delivery.breaker.snapshot()
    }

    /// Stops accepting records and lets workers drain the queue for up to
    /// `grace`, then cancels whatever is still retrying.
    ///
    /// Idempotent.
    pub async fn shutdown(&self, grace: Duration) {
        let sender = lock(&self.shared.sender).take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let mut remaining = std::mem::take(&mut *lock(&self.shared.workers));
        info!(workers = remaining.len(), ?grace, "Draining forward queue");

        let drained = tokio::time::timeout(grace, async {
            while let Some(worker) = remaining.last_mut() {
                let _ = worker.await;
                remaining.pop();
            }
        })
        .await;

        let cancel = &self.shared.delivery.cancel;
        if drained.is_err() {
            warn!(?grace, "Forward queue not drained in time, cancelling deliveries");
            cancel.cancel();
            for worker in remaining {
                let _ = worker.await;
            }
        }
        cancel.cancel();

        let stats = self.stats();
        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            rejected_open = stats.rejected_open,
            "Forwarding pipeline stopped"
        );
    }
}

impl std::fmt::Debug for ForwardingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingHandle")
            .field("destination", &self.destination())
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
