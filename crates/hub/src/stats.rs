//! Telemetry counters and latest field values for the dashboard.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

/// Distinct field names kept for the dashboard's field table.
pub const MAX_TRACKED_FIELDS: usize = 4096;

/// Latest value of one simulator field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSnapshot {
    pub field: String,
    pub value: f32,
    /// Time since the value arrived.
    pub age: Duration,
}

#[derive(Debug, Default)]
struct StatsInner {
    fields: HashMap<String, (f32, Instant)>,
    per_device: HashMap<String, u64>,
    datagrams: u64,
    undecodable: u64,
    untracked: u64,
}

#[derive(Debug)]
pub struct TelemetryStats {
    inner: RwLock<StatsInner>,
    field_limit: usize,
}

impl Default for TelemetryStats {
    fn default() -> Self {
        Self::with_field_limit(MAX_TRACKED_FIELDS)
    }
}

impl TelemetryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `limit` distinct fields; values of further new names
    /// are counted but not stored.
    pub fn with_field_limit(limit: usize) -> Self {
        Self {
            inner: RwLock::new(StatsInner::default()),
            field_limit: limit,
        }
    }

    pub fn record_field(&self, field: &str, value: f32) {
        self.record_field_at(field, value, Instant::now());
    }

    pub fn record_field_at(&self, field: &str, value: f32, at: Instant) {
        let mut inner = self.inner.write();
        inner.datagrams = inner.datagrams.saturating_add(1);
        let tracked = inner.fields.len();
        match inner.fields.get_mut(field) {
            Some(slot) => *slot = (value, at),
            None if tracked < self.field_limit => {
                inner.fields.insert(field.to_string(), (value, at));
            }
            None => inner.untracked = inner.untracked.saturating_add(1),
        }
    }

    pub fn record_undecodable(&self) {
        let mut inner = self.inner.write();
        inner.undecodable = inner.undecodable.saturating_add(1);
    }

    /// Counts one telemetry message routed to `device_id`.
    pub fn record_device(&self, device_id: &str) {
        let mut inner = self.inner.write();
        match inner.per_device.get_mut(device_id) {
            Some(count) => *count = count.saturating_add(1),
            None => {
                inner.per_device.insert(device_id.to_string(), 1);
            }
        }
    }

    pub fn device_messages(&self, device_id: &str) -> u64 {
        self.inner.read().per_device.get(device_id).copied().unwrap_or(0)
    }

    pub fn total_datagrams(&self) -> u64 {
        self.inner.read().datagrams
    }

    pub fn undecodable(&self) -> u64 {
        self.inner.read().undecodable
    }

    /// Values dropped because the field table was full.
    pub fn untracked(&self) -> u64 {
        self.inner.read().untracked
    }

    /// Every field seen so far, ordered by name.
    pub fn fields_at(&self, now: Instant) -> Vec<FieldSnapshot> {
        let mut fields: Vec<FieldSnapshot> = self
            .inner
            .read()
            .fields
            .iter()
            .map(|(field, (value, at))| FieldSnapshot {
                field: field.clone(),
                value: *value,
                age: now.saturating_duration_since(*at),
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        fields
    }

    pub fn fields(&self) -> Vec<FieldSnapshot> {
        self.fields_at(Instant::now())
    }
}
