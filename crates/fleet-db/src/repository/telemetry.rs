//! # Telemetry Repository
//!
//! Devices, metrics, alerts and activities as seen by one service.
//!
//! Telemetry can reach the central service before the device's registration
//! does. Every insert therefore first ensures a placeholder `devices` row in
//! the same transaction; a later registration fills in the real fields.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, PgConnection, PgPool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use fleet_core::{Activity, Alert, AlertSeverity, Device, MetricSample};

/// Storage seam for device telemetry.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Inserts or replaces a device (last write wins).
    async fn upsert_device(&self, device: &Device) -> DbResult<()>;

    async fn insert_metric(&self, metric: &MetricSample) -> DbResult<()>;

    async fn insert_alert(&self, alert: &Alert) -> DbResult<()>;

    async fn insert_activity(&self, activity: &Activity) -> DbResult<()>;

    /// Most recent alerts for a device, newest first.
    async fn list_alerts(&self, device_id: &str, limit: i64) -> DbResult<Vec<Alert>>;
}

// =============================================================================
// Queries
// =============================================================================

pub async fn upsert_device(conn: &mut PgConnection, device: &Device) -> DbResult<()> {
    debug!(device_id = %device.id, "Upserting device");

    sqlx::query(
        r#"
        INSERT INTO devices (id, name, device_type, os, ip_address, last_seen, is_online)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE SET
            name        = EXCLUDED.name,
            device_type = EXCLUDED.device_type,
            os          = EXCLUDED.os,
            ip_address  = EXCLUDED.ip_address,
            last_seen   = GREATEST(devices.last_seen, EXCLUDED.last_seen),
            is_online   = EXCLUDED.is_online,
            updated_at  = NOW()
        "#,
    )
    .bind(&device.id)
    .bind(&device.name)
    .bind(&device.device_type)
    .bind(&device.os)
    .bind(&device.ip_address)
    .bind(device.last_seen)
    .bind(device.is_online)
    .execute(conn)
    .await?;

    Ok(())
}

/// Creates a placeholder device, or bumps `last_seen` forward.
async fn ensure_device(conn: &mut PgConnection, device_id: &str, seen_at: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO devices (id, name, last_seen) VALUES ($1, $1, $2)
        ON CONFLICT (id) DO UPDATE SET last_seen = GREATEST(devices.last_seen, EXCLUDED.last_seen)
        "#,
    )
    .bind(device_id)
    .bind(seen_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn insert_metric(conn: &mut PgConnection, metric: &MetricSample) -> DbResult<()> {
    let mut tx = conn.begin().await?;
    ensure_device(&mut tx, &metric.device_id, metric.recorded_at).await?;

    sqlx::query(
        r#"
        INSERT INTO metrics (device_id, recorded_at, cpu_usage, memory_usage, disk_usage, uptime_secs)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&metric.device_id)
    .bind(metric.recorded_at)
    .bind(metric.cpu_usage)
    .bind(metric.memory_usage)
    .bind(metric.disk_usage)
    .bind(metric.uptime_secs)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn insert_alert(conn: &mut PgConnection, alert: &Alert) -> DbResult<()> {
    let mut tx = conn.begin().await?;
    ensure_device(&mut tx, &alert.device_id, alert.raised_at).await?;

    sqlx::query(
        r#"
        INSERT INTO alerts (device_id, raised_at, severity, alert_type, message)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&alert.device_id)
    .bind(alert.raised_at)
    .bind(alert.severity.as_str())
    .bind(&alert.alert_type)
    .bind(&alert.message)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn insert_activity(conn: &mut PgConnection, activity: &Activity) -> DbResult<()> {
    let mut tx = conn.begin().await?;
    ensure_device(&mut tx, &activity.device_id, activity.occurred_at).await?;

    sqlx::query(
        r#"
        INSERT INTO activities (device_id, occurred_at, activity_type, description)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&activity.device_id)
    .bind(activity.occurred_at)
    .bind(&activity.activity_type)
    .bind(&activity.description)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, FromRow)]
struct AlertRow {
    device_id: String,
    raised_at: DateTime<Utc>,
    severity: String,
    alert_type: String,
    message: String,
}

impl TryFrom<AlertRow> for Alert {
    type Error = DbError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let severity = match row.severity.as_str() {
            "info" => AlertSeverity::Info,
            "warning" => AlertSeverity::Warning,
            "critical" => AlertSeverity::Critical,
            other => {
                return Err(DbError::InvalidData {
                    table: "alerts".to_string(),
                    message: format!("unknown severity '{other}'"),
                })
            }
        };

        Ok(Alert {
            device_id: row.device_id,
            raised_at: row.raised_at,
            severity,
            alert_type: row.alert_type,
            message: row.message,
        })
    }
}

pub async fn list_alerts(conn: &mut PgConnection, device_id: &str, limit: i64) -> DbResult<Vec<Alert>> {
    let rows: Vec<AlertRow> = sqlx::query_as(
        r#"
        SELECT device_id, raised_at, severity, alert_type, message
          FROM alerts
         WHERE device_id = $1
         ORDER BY raised_at DESC, id DESC
         LIMIT $2
        "#,
    )
    .bind(device_id)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(Alert::try_from).collect()
}

// =============================================================================
// Pool-backed Repository
// =============================================================================

/// [`TelemetryStore`] over a connection pool.
#[derive(Debug, Clone)]
pub struct PgTelemetryRepository {
    pool: PgPool,
}

impl PgTelemetryRepository {
    pub fn new(pool: PgPool) -> Self {
        PgTelemetryRepository { pool }
    }
}

#[async_trait]
impl TelemetryStore for PgTelemetryRepository {
    async fn upsert_device(&self, device: &Device) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_device(&mut conn, device).await
    }

    async fn insert_metric(&self, metric: &MetricSample) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_metric(&mut conn, metric).await
    }

    async fn insert_alert(&self, alert: &Alert) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_alert(&mut conn, alert).await
    }

    async fn insert_activity(&self, activity: &Activity) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_activity(&mut conn, activity).await
    }

    async fn list_alerts(&self, device_id: &str, limit: i64) -> DbResult<Vec<Alert>> {
        let mut conn = self.pool.acquire().await?;
        list_alerts(&mut conn, device_id, limit).await
    }
}
