//! Records the ingestion service relays to the central service.

use serde::Serialize;

use fleet_core::{Activity, Alert, Device, MetricSample};

/// One persisted record, serialized exactly as the central service's
/// ingestion endpoint expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ForwardRecord {
    /// Upsert on the receiving side; safe to deliver twice.
    DeviceRegistration(Device),
    Metric(MetricSample),
    Alert(Alert),
    Activity(Activity),
}

impl ForwardRecord {
    /// Operation name used in logs and spans.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardRecord::DeviceRegistration(_) => "device_registration",
            ForwardRecord::Metric(_) => "metric",
            ForwardRecord::Alert(_) => "alert",
            ForwardRecord::Activity(_) => "activity",
        }
    }

    /// Identifies the record in logs.
    pub fn record_id(&self) -> String {
        match self {
            ForwardRecord::DeviceRegistration(device) => device.id.clone(),
            ForwardRecord::Metric(metric) => metric.record_key(),
            ForwardRecord::Alert(alert) => alert.record_key(),
            ForwardRecord::Activity(activity) => activity.record_key(),
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            ForwardRecord::DeviceRegistration(device) => &device.id,
            ForwardRecord::Metric(metric) => &metric.device_id,
            ForwardRecord::Alert(alert) => &alert.device_id,
            ForwardRecord::Activity(activity) => &activity.device_id,
        }
    }

    /// Path of the matching ingestion route on the central service.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            ForwardRecord::DeviceRegistration(_) => "/api/devices/register",
            ForwardRecord::Metric(_) => "/api/metrics",
            ForwardRecord::Alert(_) => "/api/alerts",
            ForwardRecord::Activity(_) => "/api/activities",
        }
    }
}

impl From<Device> for ForwardRecord {
    fn from(device: Device) -> Self {
        ForwardRecord::DeviceRegistration(device)
    }
}

impl From<MetricSample> for ForwardRecord {
    fn from(metric: MetricSample) -> Self {
        ForwardRecord::Metric(metric)
    }
}

impl From<Alert> for ForwardRecord {
    fn from(alert: Alert) -> Self {
        ForwardRecord::Alert(alert)
    }
}

impl From<Activity> for ForwardRecord {
    fn from(activity: Activity) -> Self {
        ForwardRecord::Activity(activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fleet_core::AlertSeverity;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_serializes_as_bare_payload() {
        let record = ForwardRecord::from(Alert {
            device_id: "d1".to_string(),
            raised_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            severity: AlertSeverity::Critical,
            alert_type: "disk".to_string(),
            message: "full".to_string(),
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["device_id"], "d1");
        assert_eq!(json["severity"], "critical");
        assert!(json.get("Alert").is_none());
        assert_eq!(record.endpoint_path(), "/api/alerts");
        assert_eq!(record.kind(), "alert");
        assert!(record.record_id().starts_with("d1@2024-05-01"));
    }
}
