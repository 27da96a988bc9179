//! # Relay
//!
//! One delivery attempt of one record. Retries and circuit breaking live in
//! the pipeline; a relay only reports how its single attempt went.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::{ForwardError, ForwardResult, RelayError};
use crate::record::ForwardRecord;

/// Sends records to a destination.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Destination name, also used as the circuit breaker name.
    fn destination(&self) -> &str;

    async fn send(&self, record: &ForwardRecord) -> Result<(), RelayError>;
}

/// JSON POST to the central service's ingestion routes.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
    base_url: Url,
    destination: String,
}

impl HttpRelay {
    /// ## Arguments
    /// * `base_url` - e.g. `http://central:8081`; record paths are appended
    /// * `timeout` - per-request timeout, connect included
    pub fn new(base_url: Url, timeout: Duration) -> ForwardResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForwardError::InvalidConfig {
                key: "http_client".to_string(),
                value: e.to_string(),
            })?;

        let destination = match (base_url.host_str(), base_url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => base_url.to_string(),
        };

        Ok(HttpRelay {
            client,
            base_url,
            destination,
        })
    }

    /// Full URL for a record, keeping any path prefix of the base URL.
    pub fn endpoint(&self, record: &ForwardRecord) -> String {
        format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            record.endpoint_path()
        )
    }
}

#[async_trait]
impl Relay for HttpRelay {
    fn destination(&self) -> &str {
        &self.destination
    }

    async fn send(&self, record: &ForwardRecord) -> Result<(), RelayError> {
        let url = self.endpoint(record);
        let response = self.client.post(&url).json(record).send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(%url, status = status.as_u16(), "Record relayed");
            Ok(())
        } else {
            Err(RelayError::from_status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleet_core::MetricSample;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metric() -> ForwardRecord {
        ForwardRecord::Metric(MetricSample {
            device_id: "d1".to_string(),
            recorded_at: Utc::now(),
            cpu_usage: 10.0,
            memory_usage: 20.0,
            disk_usage: 30.0,
            uptime_secs: None,
        })
    }

    fn relay(server: &MockServer) -> HttpRelay {
        HttpRelay::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_posts_json_to_record_route() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/metrics"))
            .and(body_partial_json(serde_json::json!({ "device_id": "d1", "cpu_usage": 10.0 })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        relay(&server).send(&metric()).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = relay(&server).send(&metric()).await.unwrap_err();
        assert!(matches!(err, RelayError::Status { code: 503 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let err = relay(&server).send(&metric()).await.unwrap_err();
        assert!(matches!(err, RelayError::Rejected { code: 422 }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_destination_is_transport_error() {
        let relay = HttpRelay::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = relay.send(&metric()).await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
        assert_eq!(relay.destination(), "127.0.0.1:1");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let relay = HttpRelay::new(
            Url::parse("http://central:8081/fleet/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(relay.endpoint(&metric()), "http://central:8081/fleet/api/metrics");
    }
}
