//! Receivers for records forwarded by edge services.
//!
//! Arrival order is not guaranteed: a metric may show up before the
//! registration of its device. The store creates a placeholder device in
//! that case and the later registration fills it in.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::debug;

use super::{AppState, HistoryQuery};
use crate::error::ApiResult;
use fleet_core::validation::validate_device_id;
use fleet_core::{Activity, Alert, Device, MetricSample};

#[derive(Debug, Serialize)]
pub(crate) struct Stored {
    stored: bool,
}

fn created() -> (StatusCode, Json<Stored>) {
    (StatusCode::CREATED, Json(Stored { stored: true }))
}

pub(crate) async fn register_device(
    State(state): State<AppState>,
    payload: Result<Json<Device>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Stored>)> {
    let Json(device) = payload?;
    device.validate()?;
    state.telemetry.upsert_device(&device).await?;
    debug!(device_id = %device.id, "Device registration received");
    Ok(created())
}

pub(crate) async fn record_metric(
    State(state): State<AppState>,
    payload: Result<Json<MetricSample>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Stored>)> {
    let Json(metric) = payload?;
    metric.validate()?;
    state.telemetry.insert_metric(&metric).await?;
    Ok(created())
}

pub(crate) async fn record_alert(
    State(state): State<AppState>,
    payload: Result<Json<Alert>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Stored>)> {
    let Json(alert) = payload?;
    alert.validate()?;
    state.telemetry.insert_alert(&alert).await?;
    Ok(created())
}

pub(crate) async fn record_activity(
    State(state): State<AppState>,
    payload: Result<Json<Activity>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Stored>)> {
    let Json(activity) = payload?;
    activity.validate()?;
    state.telemetry.insert_activity(&activity).await?;
    Ok(created())
}

/// Most recent alerts for a device, newest first.
pub(crate) async fn list_alerts(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Alert>>> {
    let Query(query) = query?;
    validate_device_id(&device_id)?;
    let limit = query.resolve(state.history_limit)?;
    Ok(Json(state.telemetry.list_alerts(device_id.trim(), limit).await?))
}
