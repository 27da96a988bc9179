//! Ingestion routes over an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleet_db::{ConnectionManager, DbSettings, MemoryTelemetryStore};
use fleet_forward::{ForwardConfig, ForwardingHandle};
use fleet_ingest::{router, AppState, IngestService};
use fleet_resilience::RetryConfig;

fn app(store: Arc<MemoryTelemetryStore>, forwarder: Option<ForwardingHandle>) -> (Router, Arc<IngestService>) {
    let service = Arc::new(IngestService::new(store, forwarder));
    // Never connected: readiness must report the database as down.
    let db = Arc::new(ConnectionManager::new(DbSettings::new(
        "fleet", "secret", "127.0.0.1", 1, "fleet",
    )));
    let router = router(AppState {
        service: service.clone(),
        db,
    });
    (router, service)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn register_without_forwarding() {
    let store = Arc::new(MemoryTelemetryStore::new());
    let (app, _) = app(store.clone(), None);

    let (status, body) = post(
        &app,
        "/api/devices/register",
        json!({ "id": "pos-01", "name": "Front desk", "os": "linux" }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "stored": true, "forward": "disabled" }));
    assert_eq!(store.device("pos-01").unwrap().name, "Front desk");
}

#[tokio::test]
async fn invalid_metric_is_rejected_before_storage() {
    let store = Arc::new(MemoryTelemetryStore::new());
    let (app, _) = app(store.clone(), None);

    let (status, body) = post(
        &app,
        "/api/metrics",
        json!({ "device_id": "pos-01", "cpu_usage": 140.0, "memory_usage": 10.0, "disk_usage": 10.0 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(store.metrics().is_empty());
}

#[tokio::test]
async fn device_clock_is_kept_for_metrics() {
    let store = Arc::new(MemoryTelemetryStore::new());
    let (app, _) = app(store.clone(), None);
    let recorded_at: DateTime<Utc> = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();

    let (status, _) = post(
        &app,
        "/api/metrics",
        json!({
            "device_id": "pos-02",
            "recorded_at": recorded_at.to_rfc3339(),
            "cpu_usage": 12.0,
            "memory_usage": 34.0,
            "disk_usage": 56.0,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let metrics = store.metrics();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].recorded_at, recorded_at);
    // The placeholder device is last seen at the sample time, not at arrival.
    assert_eq!(store.device("pos-02").unwrap().last_seen, recorded_at);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let (app, _) = app(Arc::new(MemoryTelemetryStore::new()), None);

    let request = Request::post("/api/alerts")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn alert_and_activity_are_stored() {
    let store = Arc::new(MemoryTelemetryStore::new());
    let (app, _) = app(store.clone(), None);

    let (status, _) = post(
        &app,
        "/api/alerts",
        json!({
            "device_id": "pos-01",
            "severity": "critical",
            "alert_type": "disk",
            "message": "Disk almost full",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = post(
        &app,
        "/api/activities",
        json!({ "device_id": "pos-01", "activity_type": "login" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(store.alerts().len(), 1);
    assert_eq!(store.activities().len(), 1);
    // Telemetry for an unregistered device creates a placeholder.
    assert!(store.device("pos-01").is_some());
}

#[tokio::test]
async fn liveness_and_readiness() {
    let (app, _) = app(Arc::new(MemoryTelemetryStore::new()), None);

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = send(&app, Request::get("/health/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
    assert_eq!(body["forwarding"], Value::Null);
}

#[tokio::test]
async fn local_write_succeeds_while_central_is_down() {
    let central = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&central)
        .await;

    let forwarder = ForwardingHandle::from_config(&ForwardConfig {
        central_url: Some(central.uri()),
        workers: 1,
        retry: RetryConfig::external_service().initial_delay(Duration::from_millis(5)),
        ..ForwardConfig::default()
    })
    .unwrap();

    let store = Arc::new(MemoryTelemetryStore::new());
    let (app, service) = app(store.clone(), forwarder);

    let (status, body) = post(
        &app,
        "/api/metrics",
        json!({ "device_id": "pos-01", "cpu_usage": 12.5, "memory_usage": 40.0, "disk_usage": 71.0 }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "stored": true, "forward": "queued" }));
    assert_eq!(store.metrics().len(), 1);

    service.shutdown(Duration::from_secs(10)).await;

    let (_, ready) = send(&app, Request::get("/health/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(ready["forwarding"]["stats"]["failed"], 1);
    assert_eq!(ready["forwarding"]["stats"]["delivered"], 0);
}
