//! Central service settings, read from the environment.
//!
//! | Variable                      | Default        |
//! |-------------------------------|----------------|
//! | `CENTRAL_BIND_ADDR`           | `0.0.0.0:8081` |
//! | `CENTRAL_HISTORY_LIMIT`       | `50`           |
//!
//! Database settings come from the `DB_*` variables via `DbSettings`.

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CentralConfig {
    pub bind_addr: SocketAddr,

    /// Default page size for command history.
    pub history_limit: i64,
}

impl Default for CentralConfig {
    fn default() -> Self {
        CentralConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            history_limit: 50,
        }
    }
}

impl CentralConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("CENTRAL_BIND_ADDR") {
            config.bind_addr = parse("CENTRAL_BIND_ADDR", &raw)?;
        }
        if let Some(raw) = lookup("CENTRAL_HISTORY_LIMIT") {
            let limit: i64 = parse("CENTRAL_HISTORY_LIMIT", &raw)?;
            if !(1..=crate::routes::MAX_HISTORY_LIMIT).contains(&limit) {
                return Err(ConfigError::InvalidValue {
                    key: "CENTRAL_HISTORY_LIMIT".to_string(),
                    value: raw,
                });
            }
            config.history_limit = limit;
        }
        Ok(config)
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

    #[test]
    fn test_defaults_and_overrides() {
        let config = CentralConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, CentralConfig::default());
        assert_eq!(config.bind_addr.port(), 8081);

        let config = CentralConfig::from_lookup(|key| match key {
            "CENTRAL_BIND_ADDR" => Some("127.0.0.1:9900".to_string()),
            "CENTRAL_HISTORY_LIMIT" => Some("20".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9900);
        assert_eq!(config.history_limit, 20);
    }

    #[test]
    fn test_invalid_values() {
        assert!(CentralConfig::from_lookup(|key| {
            (key == "CENTRAL_BIND_ADDR").then(|| "localhost".to_string())
        })
        .is_err());
        assert!(CentralConfig::from_lookup(|key| {
            (key == "CENTRAL_HISTORY_LIMIT").then(|| "0".to_string())
        })
        .is_err());
    }
}
