//! # Ingestion Service Configuration
//!
//! ## Load Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. Defaults                                                           │
//! │  2. TOML file named by FLEET_INGEST_CONFIG (optional)                  │
//! │  3. Environment (highest priority)                                     │
//! │       INGEST_BIND_ADDR, INGEST_SHUTDOWN_GRACE_SECS,                    │
//! │       CENTRAL_SERVICE_URL, FORWARD_*                                   │
//! │                                                                         │
//! │  Database settings are separate and always come from DB_* variables.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:8080"
//! shutdown_grace_secs = 10
//!
//! [forward]
//! central_url = "http://central:8081"
//! workers = 4
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use fleet_forward::{ForwardConfig, ForwardError};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub const CONFIG_PATH_VAR: &str = "FLEET_INGEST_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// How long queued forwards may drain after the HTTP server stops.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub forward: ForwardConfig,
}

impl IngestConfig {
    /// Loads from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match lookup(CONFIG_PATH_VAR).filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::from_file(Path::new(path.trim()))?,
            None => Self::default(),
        };
        base.with_env(lookup)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded config file");
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("INGEST_BIND_ADDR") {
            self.server.bind_addr = addr.trim().to_string();
        }
        if let Some(raw) = lookup("INGEST_SHUTDOWN_GRACE_SECS") {
            self.server.shutdown_grace_secs = parse("INGEST_SHUTDOWN_GRACE_SECS", &raw)?;
        }
        self.forward = self.forward.with_env(&lookup)?;
        self.bind_addr()?;
        Ok(self)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse("server.bind_addr", &self.server.bind_addr)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::load_from(env(&[])).unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
        assert!(!config.forward.is_enabled());
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
    }

    #[test]
    fn test_file_then_env_override() {
        let file = IngestConfig::from_toml(
            r#"
            [server]
            bind_addr = "127.0.0.1:9000"

            [forward]
            central_url = "http://central:8081"
            workers = 2
            "#,
        )
        .unwrap();
        assert_eq!(file.forward.workers, 2);
        assert_eq!(file.forward.queue_capacity, 1024);

        let config = file
            .with_env(env(&[
                ("INGEST_BIND_ADDR", "127.0.0.1:9100"),
                ("CENTRAL_SERVICE_URL", "http://other:8081"),
            ]))
            .unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 9100);
        assert_eq!(config.forward.central_url.as_deref(), Some("http://other:8081"));
        assert_eq!(config.forward.workers, 2);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            IngestConfig::load_from(env(&[("INGEST_BIND_ADDR", "not-an-addr")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            IngestConfig::load_from(env(&[("CENTRAL_SERVICE_URL", "::nope")])),
            Err(ConfigError::Forward(_))
        ));
        assert!(matches!(
            IngestConfig::from_toml("[server\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            IngestConfig::load_from(env(&[(CONFIG_PATH_VAR, "/nonexistent/ingest.toml")])),
            Err(ConfigError::Read { .. })
        ));
    }
}
