//! # Telemetry Types
//!
//! Records devices send to the ingestion service and that the ingestion
//! service forwards to the central service.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Telemetry Types                                 │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Device       │   │  MetricSample   │   │     Alert       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (opaque)    │   │  device_id      │   │  device_id      │       │
//! │  │  name, os, ip   │   │  cpu/mem/disk % │   │  severity       │       │
//! │  │  last_seen      │   │  recorded_at    │   │  raised_at      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │     upsert (LWW)          append-only           append-only            │
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │    Activity     │   Every append-only record is identified in logs  │
//! │  │  ─────────────  │   by `device_id@timestamp` (see `record_key`).    │
//! │  │  activity_type  │                                                    │
//! │  │  occurred_at    │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timestamps are optional on the wire and default to the time the record
//! was deserialized.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{validate_device_id, validate_percentage, validate_text, ValidationResult};

fn record_key(device_id: &str, at: &DateTime<Utc>) -> String {
    format!("{}@{}", device_id, at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

// =============================================================================
// Device
// =============================================================================

/// A registered device. Registration is an upsert keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
    #[serde(default = "default_online")]
    pub is_online: bool,
}

fn default_online() -> bool {
    true
}

impl Device {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_device_id(&self.id)?;
        validate_text("name", &self.name)
    }
}

// =============================================================================
// Metric Sample
// =============================================================================

/// Resource usage sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub device_id: String,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    #[serde(default)]
    pub uptime_secs: Option<i64>,
}

impl MetricSample {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_device_id(&self.device_id)?;
        validate_percentage("cpu_usage", self.cpu_usage)?;
        validate_percentage("memory_usage", self.memory_usage)?;
        validate_percentage("disk_usage", self.disk_usage)
    }

    pub fn record_key(&self) -> String {
        record_key(&self.device_id, &self.recorded_at)
    }
}

// =============================================================================
// Alert
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub device_id: String,
    #[serde(default = "Utc::now")]
    pub raised_at: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub alert_type: String,
    pub message: String,
}

impl Alert {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_device_id(&self.device_id)?;
        validate_text("alert_type", &self.alert_type)?;
        validate_text("message", &self.message)
    }

    pub fn record_key(&self) -> String {
        record_key(&self.device_id, &self.raised_at)
    }
}

// =============================================================================
// Activity
// =============================================================================

/// User or system activity observed on a device (logins, app launches...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub device_id: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
    pub activity_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Activity {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_device_id(&self.device_id)?;
        validate_text("activity_type", &self.activity_type)
    }

    pub fn record_key(&self) -> String {
        record_key(&self.device_id, &self.occurred_at)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
