//! Forwarding to a central service that is down, over real HTTP.

use std::time::Duration;

use chrono::Utc;
use fleet_core::MetricSample;
use fleet_forward::{ForwardConfig, ForwardingHandle, SubmitOutcome};
use fleet_resilience::{CircuitState, RetryConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn metric(device_id: &str) -> MetricSample {
    MetricSample {
        device_id: device_id.to_string(),
        recorded_at: Utc::now(),
        cpu_usage: 55.0,
        memory_usage: 60.0,
        disk_usage: 70.0,
        uptime_secs: Some(120),
    }
}

fn config(central_url: String) -> ForwardConfig {
    ForwardConfig {
        central_url: Some(central_url),
        workers: 1,
        breaker_max_failures: 3,
        breaker_timeout_secs: 60,
        retry: RetryConfig::external_service().initial_delay(Duration::from_millis(5)),
        ..ForwardConfig::default()
    }
}

#[tokio::test]
async fn open_breaker_stops_contacting_the_destination() {
    let central = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/metrics"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&central)
        .await;

    let forwarder = ForwardingHandle::from_config(&config(central.uri()))
        .unwrap()
        .expect("forwarding enabled");

    assert_eq!(forwarder.submit(metric("d1")), SubmitOutcome::Queued);
    assert_eq!(forwarder.submit(metric("d2")), SubmitOutcome::Queued);
    forwarder.shutdown(Duration::from_secs(10)).await;

    // Three attempts for d1 open the breaker; d2 is rejected without a request.
    let requests = central.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);

    let stats = forwarder.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.rejected_open, 1);
    assert_eq!(stats.delivered, 0);
    assert_eq!(forwarder.breaker().state, CircuitState::Open);
}

#[tokio::test]
async fn healthy_destination_receives_every_record() {
    let central = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/metrics"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&central)
        .await;

    let forwarder = ForwardingHandle::from_config(&config(central.uri()))
        .unwrap()
        .expect("forwarding enabled");

    for device in ["d1", "d2", "d3"] {
        forwarder.submit(metric(device));
    }
    forwarder.shutdown(Duration::from_secs(10)).await;

    assert_eq!(forwarder.stats().delivered, 3);
    assert_eq!(forwarder.breaker().state, CircuitState::Closed);
}
