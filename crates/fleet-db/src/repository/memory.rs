//! In-memory stores for tests and running a service without PostgreSQL.
//!
//! Same observable semantics as the Pg repositories, including the
//! compare-and-set on command status and the `remote_commands.device_id`
//! foreign key. A command store only accepts devices present in its
//! registry; share the registry with a telemetry store through
//! [`MemoryCommandStore::sharing_devices`] so registrations and
//! placeholder devices become visible to commands.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::command::CommandStore;
use super::telemetry::TelemetryStore;
use crate::error::{DbError, DbResult};
use fleet_core::{Activity, Alert, CommandStatus, Device, MetricSample, RemoteCommand};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Commands
// =============================================================================

type DeviceRegistry = Arc<Mutex<HashMap<String, Device>>>;

fn placeholder_device(device_id: &str, seen_at: DateTime<Utc>) -> Device {
    Device {
        id: device_id.to_string(),
        name: device_id.to_string(),
        device_type: None,
        os: None,
        ip_address: None,
        last_seen: seen_at,
        is_online: true,
    }
}

#[derive(Debug, Default)]
pub struct MemoryCommandStore {
    commands: Mutex<HashMap<String, RemoteCommand>>,
    devices: DeviceRegistry,
}

impl MemoryCommandStore {
    /// Empty store with its own empty registry: every insert is rejected
    /// until a device is known.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose known devices are exactly those of `telemetry`.
    pub fn sharing_devices(telemetry: &MemoryTelemetryStore) -> Self {
        Self {
            commands: Mutex::default(),
            devices: Arc::clone(&telemetry.devices),
        }
    }

    /// Store that already knows the given device ids.
    pub fn with_devices<I, S>(device_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        let devices = device_ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                (id.clone(), placeholder_device(&id, now))
            })
            .collect();
        Self {
            commands: Mutex::default(),
            devices: Arc::new(Mutex::new(devices)),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.commands).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CommandStore for MemoryCommandStore {
    async fn insert(&self, command: &RemoteCommand) -> DbResult<()> {
        if !lock(&self.devices).contains_key(&command.device_id) {
            return Err(DbError::ForeignKeyViolation {
                message: format!(
                    "remote_commands.device_id {} is not present in devices",
                    command.device_id
                ),
            });
        }
        let mut commands = lock(&self.commands);
        if commands.contains_key(&command.id) {
            return Err(DbError::UniqueViolation {
                constraint: "remote_commands_pkey".to_string(),
            });
        }
        commands.insert(command.id.clone(), command.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> DbResult<Option<RemoteCommand>> {
        Ok(lock(&self.commands).get(id).cloned())
    }

    async fn list_pending(&self, device_id: &str) -> DbResult<Vec<RemoteCommand>> {
        let mut pending: Vec<_> = lock(&self.commands)
            .values()
            .filter(|c| c.device_id == device_id && c.status == CommandStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn list_for_device(&self, device_id: &str, limit: i64) -> DbResult<Vec<RemoteCommand>> {
        let mut all: Vec<_> = lock(&self.commands)
            .values()
            .filter(|c| c.device_id == device_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        all.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(all)
    }

    async fn update_if_status(
        &self,
        command: &RemoteCommand,
        expected: CommandStatus,
    ) -> DbResult<bool> {
        let mut commands = lock(&self.commands);
        match commands.get_mut(&command.id) {
            Some(stored) if stored.status == expected => {
                stored.status = command.status;
                stored.started_at = command.started_at;
                stored.completed_at = command.completed_at;
                stored.result = command.result.clone();
                stored.exit_code = command.exit_code;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// =============================================================================
// Telemetry
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryTelemetryStore {
    devices: DeviceRegistry,
    metrics: Mutex<Vec<MetricSample>>,
    alerts: Mutex<Vec<Alert>>,
    activities: Mutex<Vec<Activity>>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self, id: &str) -> Option<Device> {
        lock(&self.devices).get(id).cloned()
    }

    pub fn metrics(&self) -> Vec<MetricSample> {
        lock(&self.metrics).clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        lock(&self.alerts).clone()
    }

    pub fn activities(&self) -> Vec<Activity> {
        lock(&self.activities).clone()
    }

    fn ensure_device(&self, device_id: &str, seen_at: DateTime<Utc>) {
        lock(&self.devices)
            .entry(device_id.to_string())
            .and_modify(|d| d.last_seen = d.last_seen.max(seen_at))
            .or_insert_with(|| placeholder_device(device_id, seen_at));
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn upsert_device(&self, device: &Device) -> DbResult<()> {
        let mut devices = lock(&self.devices);
        let last_seen = devices
            .get(&device.id)
            .map_or(device.last_seen, |known| known.last_seen.max(device.last_seen));
        devices.insert(
            device.id.clone(),
            Device {
                last_seen,
                ..device.clone()
            },
        );
        Ok(())
    }

    async fn insert_metric(&self, metric: &MetricSample) -> DbResult<()> {
        self.ensure_device(&metric.device_id, metric.recorded_at);
        lock(&self.metrics).push(metric.clone());
        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> DbResult<()> {
        self.ensure_device(&alert.device_id, alert.raised_at);
        lock(&self.alerts).push(alert.clone());
        Ok(())
    }

    async fn insert_activity(&self, activity: &Activity) -> DbResult<()> {
        self.ensure_device(&activity.device_id, activity.occurred_at);
        lock(&self.activities).push(activity.clone());
        Ok(())
    }

    async fn list_alerts(&self, device_id: &str, limit: i64) -> DbResult<Vec<Alert>> {
        // Insertion index stands in for the serial `id` tiebreak.
        let mut alerts: Vec<(usize, Alert)> = lock(&self.alerts)
            .iter()
            .enumerate()
            .filter(|(_, a)| a.device_id == device_id)
            .map(|(seq, a)| (seq, a.clone()))
            .collect();
        alerts.sort_by(|(a_seq, a), (b_seq, b)| {
            b.raised_at.cmp(&a.raised_at).then_with(|| b_seq.cmp(a_seq))
        });
        alerts.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(alerts.into_iter().map(|(_, a)| a).collect())
    }
}
