//! # Forwarding Configuration
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CENTRAL_SERVICE_URL=http://central:8081                            │
//! │     FORWARD_QUEUE_CAPACITY, FORWARD_WORKERS,                           │
//! │     FORWARD_REQUEST_TIMEOUT_SECS                                       │
//! │                                                                         │
//! │  2. [forward] table of the ingestion service's TOML file               │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     no central URL → forwarding disabled                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [forward]
//! central_url = "http://central:8081"
//! queue_capacity = 1024
//! workers = 4
//! request_timeout_secs = 10
//! breaker_max_failures = 5
//! breaker_timeout_secs = 30
//! breaker_half_open_requests = 3
//! ```

use std::str::FromStr;
use std::time::Duration;

use fleet_resilience::{CircuitBreakerConfig, RetryConfig};
use serde::Deserialize;
use url::Url;

use crate::error::{ForwardError, ForwardResult};

pub const CENTRAL_SERVICE_URL: &str = "CENTRAL_SERVICE_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    /// Base URL of the central service. `None` disables forwarding.
    #[serde(default)]
    pub central_url: Option<String>,

    /// Records waiting for a worker; beyond this, new records are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_breaker_max_failures")]
    pub breaker_max_failures: u32,

    #[serde(default = "default_breaker_timeout")]
    pub breaker_timeout_secs: u64,

    #[serde(default = "default_breaker_half_open")]
    pub breaker_half_open_requests: u32,

    /// Retry schedule per record. Not read from files.
    #[serde(skip, default = "RetryConfig::external_service")]
    pub retry: RetryConfig,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_workers() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    10
}

fn default_breaker_max_failures() -> u32 {
    CircuitBreakerConfig::default().max_failures
}

fn default_breaker_timeout() -> u64 {
    CircuitBreakerConfig::default().timeout.as_secs()
}

fn default_breaker_half_open() -> u32 {
    CircuitBreakerConfig::default().max_half_open_requests
}

impl Default for ForwardConfig {
    fn default() -> Self {
        ForwardConfig {
            central_url: None,
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            request_timeout_secs: default_request_timeout(),
            breaker_max_failures: default_breaker_max_failures(),
            breaker_timeout_secs: default_breaker_timeout(),
            breaker_half_open_requests: default_breaker_half_open(),
            retry: RetryConfig::external_service(),
        }
    }
}

impl ForwardConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> ForwardResult<Self> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup` on top of `self`, then validates.
    ///
    /// An empty `CENTRAL_SERVICE_URL` disables forwarding.
    pub fn with_env<F>(mut self, lookup: F) -> ForwardResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(CENTRAL_SERVICE_URL) {
            let url = url.trim();
            self.central_url = (!url.is_empty()).then(|| url.to_string());
        }
        if let Some(raw) = lookup("FORWARD_QUEUE_CAPACITY") {
            self.queue_capacity = parse("FORWARD_QUEUE_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("FORWARD_WORKERS") {
            self.workers = parse("FORWARD_WORKERS", &raw)?;
        }
        if let Some(raw) = lookup("FORWARD_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse("FORWARD_REQUEST_TIMEOUT_SECS", &raw)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ForwardResult<()> {
        if let Some(url) = &self.central_url {
            self.central_base_url(url)?;
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "0"));
        }
        if self.workers == 0 {
            return Err(invalid("workers", "0"));
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.central_url.is_some()
    }

    pub fn central_base_url(&self, raw: &str) -> ForwardResult<Url> {
        let url = Url::parse(raw).map_err(|_| invalid(CENTRAL_SERVICE_URL, raw))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(invalid(CENTRAL_SERVICE_URL, raw)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: self.breaker_max_failures,
            timeout: Duration::from_secs(self.breaker_timeout_secs),
            max_half_open_requests: self.breaker_half_open_requests,
        }
    }
}

fn invalid(key: &str, value: &str) -> ForwardError {
    ForwardError::InvalidConfig {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> ForwardResult<T> {
    raw.trim().parse().map_err(|_| invalid(key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_unset_url_disables_forwarding() {
        let config = ForwardConfig::default().with_env(lookup(&[])).unwrap();
        assert!(!config.is_enabled());

        let config = ForwardConfig::default()
            .with_env(lookup(&[(CENTRAL_SERVICE_URL, "  ")]))
            .unwrap();
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_env_overrides() {
        let config = ForwardConfig::default()
            .with_env(lookup(&[
                (CENTRAL_SERVICE_URL, "http://central:8081"),
                ("FORWARD_WORKERS", "2"),
                ("FORWARD_QUEUE_CAPACITY", "16"),
            ]))
            .unwrap();
        assert_eq!(config.central_url.as_deref(), Some("http://central:8081"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.retry, RetryConfig::external_service());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ForwardConfig::default()
            .with_env(lookup(&[(CENTRAL_SERVICE_URL, "ftp://central")]))
            .unwrap_err();
        assert!(matches!(err, ForwardError::InvalidConfig { ref key, .. } if key == CENTRAL_SERVICE_URL));

        assert!(ForwardConfig::default()
            .with_env(lookup(&[("FORWARD_WORKERS", "0")]))
            .is_err());
        assert!(ForwardConfig::default()
            .with_env(lookup(&[("FORWARD_WORKERS", "many")]))
            .is_err());
    }

    #[test]
    fn test_breaker_defaults_follow_resilience_crate() {
        assert_eq!(ForwardConfig::default().breaker_config(), CircuitBreakerConfig::default());
    }
}
