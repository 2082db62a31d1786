//! Device registry and liveness tracking.
//!
//! A device exists in the registry from its first heartbeat until a sweep
//! finds it silent for longer than the timeout. Eviction removes the entry;
//! there is no offline flag.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use simpanel_protocol::Heartbeat;
use tracing::{debug, info, warn};

use crate::error::{HubError, HubResult};

/// One live controller.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_id: String,
    pub address: IpAddr,
    pub last_seen: Instant,
    pub last_seen_at: DateTime<Utc>,
    /// Reported uptime, `?` when the heartbeat carried none.
    pub uptime: String,
}

impl DeviceRecord {
    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Snapshot entry as the dashboard reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub ip: String,
    /// Unix timestamp in seconds.
    pub last_seen: f64,
    pub uptime: String,
}

impl From<&DeviceRecord> for SnapshotEntry {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            ip: record.address.to_string(),
            last_seen: unix_seconds(record.last_seen_at),
            uptime: record.uptime.clone(),
        }
    }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "microsecond timestamps fit f64 mantissa for centuries"
)]
fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Heartbeat-driven address book.
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, DeviceRecord>>,
    timeout: Duration,
    snapshot_path: Option<PathBuf>,
    snapshot_lock: Mutex<()>,
}

impl DeviceRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            timeout,
            snapshot_path: None,
            snapshot_lock: Mutex::new(()),
        }
    }

    /// Persists a snapshot to `path` after every heartbeat.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upserts the sender of `heartbeat`. Returns `true` for a device that
    /// was not registered.
    pub fn record_heartbeat(&self, heartbeat: &Heartbeat, address: IpAddr) -> bool {
        self.record_heartbeat_at(heartbeat, address, Instant::now())
    }

    pub fn record_heartbeat_at(&self, heartbeat: &Heartbeat, address: IpAddr, now: Instant) -> bool {
        let record = DeviceRecord {
            device_id: heartbeat.device_id.clone(),
            address,
            last_seen: now,
            last_seen_at: Utc::now(),
            uptime: heartbeat.uptime_or_unknown().to_string(),
        };

        let previous = self
            .devices
            .write()
            .insert(heartbeat.device_id.clone(), record);

        let is_new = previous.is_none();
        if is_new {
            info!(device_id = %heartbeat.device_id, address = %address, "Device online");
        } else if previous.is_some_and(|p| p.address != address) {
            info!(device_id = %heartbeat.device_id, address = %address, "Device address changed");
        } else {
            debug!(device_id = %heartbeat.device_id, uptime = heartbeat.uptime_or_unknown(), "Heartbeat");
        }

        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to write device snapshot");
        }
        is_new
    }

    /// Evicts devices silent for longer than the timeout.
    pub fn sweep(&self) -> Vec<String> {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> Vec<String> {
        let mut evicted = Vec::new();
        self.devices.write().retain(|id, record| {
            let alive = record.silent_for(now) <= self.timeout;
            if !alive {
                evicted.push(id.clone());
            }
            alive
        });

        for id in &evicted {
            info!(device_id = %id, timeout_secs = self.timeout.as_secs(), "Device offline");
        }
        evicted
    }

    pub fn address(&self, device_id: &str) -> Option<IpAddr> {
        self.devices.read().get(device_id).map(|r| r.address)
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.read().get(device_id).cloned()
    }

    /// `true` while the device is registered and within the timeout.
    pub fn is_online_at(&self, device_id: &str, now: Instant) -> bool {
        self.devices
            .read()
            .get(device_id)
            .is_some_and(|r| r.silent_for(now) <= self.timeout)
    }

    /// Registered devices ordered by id.
    pub fn list(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self.devices.read().values().cloned().collect();
        records.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        records
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, SnapshotEntry> {
        self.devices
            .read()
            .iter()
            .map(|(id, record)| (id.clone(), SnapshotEntry::from(record)))
            .collect()
    }

    /// Writes the snapshot file, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Snapshot`] when the file cannot be written.
    pub fn persist(&self) -> HubResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let _serialized = self.snapshot_lock.lock();
        let content = serde_json::to_string_pretty(&self.snapshot())?;
        write_atomic(path, &content)
    }
}

fn write_atomic(path: &Path, content: &str) -> HubResult<()> {
    let io_error = |source| HubError::Snapshot {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content).map_err(io_error)?;
    std::fs::rename(&temp_path, path).map_err(io_error)
}
