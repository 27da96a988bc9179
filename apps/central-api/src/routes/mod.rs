//! # Central HTTP Routes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  telemetry.rs  forward receivers + alert history   → TelemetryStore    │
//! │  commands.rs   create / poll / start / report      → CommandLifecycle  │
//! │  mod.rs        router, shared state, health                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod commands;
mod telemetry;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use fleet_db::{CommandLifecycle, ConnectionManager, TelemetryStore};

/// Upper bound for `?limit=` on history endpoints.
pub const MAX_HISTORY_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<dyn TelemetryStore>,
    pub commands: CommandLifecycle,
    pub db: Arc<ConnectionManager>,
    /// Page size when a history request has no `limit`.
    pub history_limit: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Forward receivers
        .route("/api/devices/register", post(telemetry::register_device))
        .route("/api/metrics", post(telemetry::record_metric))
        .route("/api/alerts", post(telemetry::record_alert))
        .route("/api/activities", post(telemetry::record_activity))
        .route("/api/devices/{device_id}/alerts", get(telemetry::list_alerts))
        // Remote commands
        .route("/api/commands", post(commands::create))
        .route("/api/commands/{id}", get(commands::get))
        .route("/api/commands/{id}/start", post(commands::start))
        .route("/api/commands/{id}/result", post(commands::report_result))
        .route("/api/devices/{device_id}/commands/pending", get(commands::pending))
        .route("/api/devices/{device_id}/commands", get(commands::history))
        // Health
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .with_state(state)
}

/// `?limit=` on history endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<i64>,
}

impl HistoryQuery {
    fn resolve(&self, default: i64) -> ApiResult<i64> {
        match self.limit {
            None => Ok(default),
            Some(limit) if (1..=MAX_HISTORY_LIMIT).contains(&limit) => Ok(limit),
            Some(limit) => Err(ApiError::validation(format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"
            ))),
        }
    }
}

async fn health() -> impl IntoResponse {
    "OK"
}

#[derive(Debug, Serialize)]
struct Readiness {
    ready: bool,
    database: String,
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Readiness {
                ready: true,
                database: "up".to_string(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Readiness {
                ready: false,
                database: e.to_string(),
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_limit_bounds() {
        let query = HistoryQuery::default();
        assert_eq!(query.resolve(50).unwrap(), 50);

        let query = HistoryQuery { limit: Some(500) };
        assert_eq!(query.resolve(50).unwrap(), 500);

        assert!(HistoryQuery { limit: Some(0) }.resolve(50).is_err());
        assert!(HistoryQuery { limit: Some(501) }.resolve(50).is_err());
    }
}
