//! Remote command routes.
//!
//! The dashboard creates commands; devices poll for pending ones, mark
//! them started and post a terminal report. All state changes go through
//! [`CommandLifecycle`](fleet_db::CommandLifecycle).

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{AppState, HistoryQuery};
use crate::error::ApiResult;
use fleet_core::{CommandReport, RemoteCommand};

#[derive(Debug, Deserialize)]
pub(crate) struct CreateCommand {
    device_id: String,
    command_text: String,
}

pub(crate) async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateCommand>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RemoteCommand>)> {
    let Json(request) = payload?;
    let command = state
        .commands
        .create(&request.device_id, &request.command_text)
        .await?;
    Ok((StatusCode::CREATED, Json(command)))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RemoteCommand>> {
    Ok(Json(state.commands.get(&id).await?))
}

pub(crate) async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RemoteCommand>> {
    Ok(Json(state.commands.start(&id).await?))
}

pub(crate) async fn report_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<CommandReport>, JsonRejection>,
) -> ApiResult<Json<RemoteCommand>> {
    let Json(report) = payload?;
    Ok(Json(state.commands.report_result(&id, &report).await?))
}

/// What a polling device should run next, oldest first.
pub(crate) async fn pending(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Vec<RemoteCommand>>> {
    Ok(Json(state.commands.poll_pending(&device_id).await?))
}

pub(crate) async fn history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<RemoteCommand>>> {
    let Query(query) = query?;
    let limit = query.resolve(state.history_limit)?;
    Ok(Json(state.commands.list_for_device(&device_id, limit).await?))
}
