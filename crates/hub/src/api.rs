//! In-process API for the operator dashboard.
//!
//! Everything the dashboard reads or changes goes through [`DashboardApi`]:
//! the device list reconciled against the mapping, calibration edits, mapping
//! readback, manual motor commands and the raw field table. The HTTP surface
//! lives in the dashboard itself.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use simpanel_calibration::{CalibrationPoint, CalibrationSet, CalibrationStore, DeviceCalibration};
use simpanel_mapping::{InstrumentMapping, MotorId, SharedResolver};
use simpanel_protocol::DeviceCommand;
use tracing::info;

use crate::dispatcher::{CommandDispatcher, SendOutcome};
use crate::error::HubResult;
use crate::registry::{DeviceRecord, DeviceRegistry};
use crate::stats::{FieldSnapshot, TelemetryStats};

/// Placeholder for values of a device that has never been seen.
pub const NOT_SEEN: &str = "-";

/// One row of the dashboard's device table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub id: String,
    pub online: bool,
    /// Instruments the mapping assigns to this device. Empty for a device
    /// that sends heartbeats but is not mapped.
    pub instruments: Vec<String>,
    pub ip: String,
    pub uptime: String,
    /// Time since the last heartbeat, `HH:MM:SS`.
    pub last_seen: String,
    pub telemetry_messages: u64,
    pub calibration: Option<DeviceCalibration>,
}

#[derive(Debug, Clone)]
pub struct DashboardApi {
    registry: Arc<DeviceRegistry>,
    resolver: Arc<SharedResolver>,
    calibrations: Arc<CalibrationStore>,
    stats: Arc<TelemetryStats>,
    dispatcher: Arc<CommandDispatcher>,
}

impl DashboardApi {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        resolver: Arc<SharedResolver>,
        calibrations: Arc<CalibrationStore>,
        stats: Arc<TelemetryStats>,
        dispatcher: Arc<CommandDispatcher>,
    ) -> Self {
        Self {
            registry,
            resolver,
            calibrations,
            stats,
            dispatcher,
        }
    }

    /// Mapped devices first, in id order, then unmapped devices that are
    /// sending heartbeats.
    pub fn devices(&self) -> Vec<DeviceStatus> {
        self.devices_at(Instant::now())
    }

    pub fn devices_at(&self, now: Instant) -> Vec<DeviceStatus> {
        let index = self.resolver.snapshot();
        let mut expected: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (name, instrument) in &index.mapping().instruments {
            expected
                .entry(instrument.device_id.as_str())
                .or_default()
                .push(name.clone());
        }

        let mut live: BTreeMap<String, DeviceRecord> = self
            .registry
            .list()
            .into_iter()
            .map(|record| (record.device_id.clone(), record))
            .collect();

        let mut rows: Vec<DeviceStatus> = expected
            .into_iter()
            .map(|(id, instruments)| {
                let record = live.remove(id);
                self.status(id, instruments, record.as_ref(), now)
            })
            .collect();
        rows.extend(
            live.values()
                .map(|record| self.status(&record.device_id, Vec::new(), Some(record), now)),
        );
        rows
    }

    fn status(
        &self,
        id: &str,
        instruments: Vec<String>,
        record: Option<&DeviceRecord>,
        now: Instant,
    ) -> DeviceStatus {
        let online = record.is_some_and(|r| r.silent_for(now) <= self.registry.timeout());
        DeviceStatus {
            id: id.to_string(),
            online,
            instruments,
            ip: record.map_or_else(|| NOT_SEEN.to_string(), |r| r.address.to_string()),
            uptime: record.map_or_else(|| NOT_SEEN.to_string(), |r| r.uptime.clone()),
            last_seen: record.map_or_else(
                || NOT_SEEN.to_string(),
                |r| format_elapsed(r.silent_for(now)),
            ),
            telemetry_messages: self.stats.device_messages(id),
            calibration: self.calibrations.get(id),
        }
    }

    pub fn calibration(&self, device_id: &str) -> Option<DeviceCalibration> {
        self.calibrations.get(device_id)
    }

    pub fn calibrations(&self) -> CalibrationSet {
        self.calibrations.all()
    }

    /// Replaces a device's calibration, persists it and pushes it to the
    /// controller as a `CAL:` command.
    ///
    /// # Errors
    ///
    /// Fails if the calibration is rejected or cannot be persisted. Delivery
    /// of the `CAL:` command is reported in the outcome, not as an error.
    pub async fn set_calibration(
        &self,
        device_id: &str,
        calibration: DeviceCalibration,
    ) -> HubResult<(DeviceCalibration, SendOutcome)> {
        let updated = self.calibrations.set(device_id, calibration)?;
        let command = DeviceCommand::calibration(&updated)?;
        let outcome = self.dispatcher.send(device_id, &command).await;
        info!(device_id = %device_id, outcome = ?outcome, "Calibration pushed");
        Ok((updated, outcome))
    }

    /// # Errors
    ///
    /// Fails on a non-finite point or when persisting fails.
    pub fn add_calibration_point(
        &self,
        device_id: &str,
        point: CalibrationPoint,
    ) -> HubResult<DeviceCalibration> {
        Ok(self.calibrations.add_point(device_id, point)?)
    }

    /// # Errors
    ///
    /// Fails for an uncalibrated device, a bad index, or when persisting fails.
    pub fn delete_calibration_point(
        &self,
        device_id: &str,
        index: usize,
    ) -> HubResult<CalibrationPoint> {
        Ok(self.calibrations.delete_point(device_id, index)?)
    }

    /// The mapping currently in effect.
    pub fn mapping(&self) -> InstrumentMapping {
        self.resolver.snapshot().mapping().clone()
    }

    /// Re-reads the mapping file. The current mapping stays in effect on
    /// failure.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not validate.
    pub fn reload_mapping(&self) -> HubResult<InstrumentMapping> {
        let index = self.resolver.reload()?;
        Ok(index.mapping().clone())
    }

    pub async fn move_motor(
        &self,
        device_id: &str,
        motor: MotorId,
        angle: f32,
        min: f32,
        max: f32,
    ) -> SendOutcome {
        let command = DeviceCommand::Move {
            motor,
            angle,
            min,
            max,
        };
        self.dispatcher.send(device_id, &command).await
    }

    pub async fn zero_motor(&self, device_id: &str, motor: MotorId) -> SendOutcome {
        self.dispatcher
            .send(device_id, &DeviceCommand::Zero { motor })
            .await
    }

    pub async fn set_bounds(&self, device_id: &str, motor: MotorId, min: f32, max: f32) -> SendOutcome {
        self.dispatcher
            .send(device_id, &DeviceCommand::Bounds { motor, min, max })
            .await
    }

    /// Latest raw value of every simulator field, with its age.
    pub fn fields(&self) -> Vec<FieldSnapshot> {
        self.stats.fields()
    }
}

/// Formats a duration as `HH:MM:SS`; hours are not wrapped at a day.
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
