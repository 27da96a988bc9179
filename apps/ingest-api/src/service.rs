//! # Ingestion Service
//!
//! Validate → persist locally → hand a copy to the forwarder.
//!
//! The local write is the only step that can fail a request. Whatever the
//! forwarder does afterwards (queue, drop, retry, give up) is reported as a
//! [`ForwardStatus`] for visibility and never changes the outcome.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::error::ApiResult;
use fleet_core::{Activity, Alert, Device, MetricSample};
use fleet_db::TelemetryStore;
use fleet_forward::{ForwardRecord, ForwardingHandle, SubmitOutcome};

/// What happened to the forwarded copy of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardStatus {
    Queued,
    Dropped,
    /// No central service configured.
    Disabled,
    /// Service is shutting down.
    Closed,
}

impl From<SubmitOutcome> for ForwardStatus {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Queued => ForwardStatus::Queued,
            SubmitOutcome::Dropped => ForwardStatus::Dropped,
            SubmitOutcome::Closed => ForwardStatus::Closed,
        }
    }
}

/// Response body for a stored record.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub stored: bool,
    pub forward: ForwardStatus,
}

pub struct IngestService {
    store: Arc<dyn TelemetryStore>,
    forwarder: Option<ForwardingHandle>,
}

impl IngestService {
    pub fn new(store: Arc<dyn TelemetryStore>, forwarder: Option<ForwardingHandle>) -> Self {
        IngestService { store, forwarder }
    }

    pub fn forwarder(&self) -> Option<&ForwardingHandle> {
        self.forwarder.as_ref()
    }

    pub async fn register_device(&self, device: Device) -> ApiResult<Receipt> {
        device.validate()?;
        self.store.upsert_device(&device).await?;
        debug!(device_id = %device.id, "Device registered");
        Ok(self.forward(device))
    }

    pub async fn record_metric(&self, metric: MetricSample) -> ApiResult<Receipt> {
        metric.validate()?;
        self.store.insert_metric(&metric).await?;
        Ok(self.forward(metric))
    }

    pub async fn record_alert(&self, alert: Alert) -> ApiResult<Receipt> {
        alert.validate()?;
        self.store.insert_alert(&alert).await?;
        debug!(device_id = %alert.device_id, severity = %alert.severity, "Alert stored");
        Ok(self.forward(alert))
    }

    pub async fn record_activity(&self, activity: Activity) -> ApiResult<Receipt> {
        activity.validate()?;
        self.store.insert_activity(&activity).await?;
        Ok(self.forward(activity))
    }

    fn forward(&self, record: impl Into<ForwardRecord>) -> Receipt {
        let forward = match &self.forwarder {
            Some(forwarder) => forwarder.submit(record).into(),
            None => ForwardStatus::Disabled,
        };
        Receipt {
            stored: true,
            forward,
        }
    }

    /// Drains the forward queue; no-op when forwarding is disabled.
    pub async fn shutdown(&self, grace: Duration) {
        if let Some(forwarder) = &self.forwarder {
            forwarder.shutdown(grace).await;
        }
    }
}
