//! HTTP routes of the ingestion service.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::ApiResult;
use crate::service::{IngestService, Receipt};
use fleet_core::{Activity, Alert, Device, MetricSample};
use fleet_db::ConnectionManager;
use fleet_forward::ForwardStatsSnapshot;
use fleet_resilience::BreakerSnapshot;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestService>,
    pub db: Arc<ConnectionManager>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/devices/register", post(register_device))
        .route("/api/metrics", post(record_metric))
        .route("/api/alerts", post(record_alert))
        .route("/api/activities", post(record_activity))
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .with_state(state)
}

// =============================================================================
// Ingestion
// =============================================================================

async fn register_device(
    State(state): State<AppState>,
    payload: Result<Json<Device>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Receipt>)> {
    let Json(device) = payload?;
    let receipt = state.service.register_device(device).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn record_metric(
    State(state): State<AppState>,
    payload: Result<Json<MetricSample>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Receipt>)> {
    let Json(metric) = payload?;
    let receipt = state.service.record_metric(metric).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn record_alert(
    State(state): State<AppState>,
    payload: Result<Json<Alert>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Receipt>)> {
    let Json(alert) = payload?;
    let receipt = state.service.record_alert(alert).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn record_activity(
    State(state): State<AppState>,
    payload: Result<Json<Activity>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Receipt>)> {
    let Json(activity) = payload?;
    let receipt = state.service.record_activity(activity).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// =============================================================================
// Health
// =============================================================================

/// Liveness: the process is serving requests.
async fn health() -> impl IntoResponse {
    "OK"
}

#[derive(Debug, Serialize)]
struct Readiness {
    ready: bool,
    database: String,
    forwarding: Option<ForwardingReport>,
}

#[derive(Debug, Serialize)]
struct ForwardingReport {
    destination: String,
    breaker: BreakerSnapshot,
    stats: ForwardStatsSnapshot,
}

/// Readiness: the local database answers. Forwarding state is reported
/// but never makes the service unready.
async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let (ready, database) = match state.db.health_check().await {
        Ok(()) => (true, "up".to_string()),
        Err(e) => (false, e.to_string()),
    };

    let forwarding = state.service.forwarder().map(|f| ForwardingReport {
        destination: f.destination().to_string(),
        breaker: f.breaker(),
        stats: f.stats(),
    });

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(Readiness {
            ready,
            database,
            forwarding,
        }),
    )
}
