//! Per-motor aggregation state machine.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use simpanel_mapping::{Combination, MotorId, MotorKey, MotorTarget, PairRole};
use tracing::trace;

/// Minimum change, in degrees, before a motor is sent a new angle.
pub const DEFAULT_DEDUP_THRESHOLD: f32 = 1.0;

/// Distinct field names remembered for first-sighting logs.
pub const MAX_SEEN_FIELDS: usize = 4096;

const FULL_TURN: f32 = 360.0;

/// Aggregation progress of one motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing observed since start or the last reset.
    Empty,
    /// Some inputs observed; output withheld.
    Partial,
    /// Every input observed; output available.
    Ready,
}

/// A new angle to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotorUpdate {
    pub key: MotorKey,
    /// Degrees in `[0, 360)`.
    pub angle: f32,
}

#[derive(Debug)]
struct MotorSlot {
    expected: usize,
    partner: Option<MotorKey>,
    values: HashMap<String, f32>,
    /// Combined, transformed and calibrated value, once every input is in.
    derived: Option<f32>,
    last_dispatched: Option<f32>,
}

impl MotorSlot {
    fn new(expected: usize, partner: Option<MotorKey>) -> Self {
        Self {
            expected,
            partner,
            values: HashMap::new(),
            derived: None,
            last_dispatched: None,
        }
    }
}

/// Runtime state for every mapped motor.
///
/// Not synchronized; the owner wraps it in a lock.
#[derive(Debug)]
pub struct MotorAggregator {
    threshold: f32,
    slots: HashMap<MotorKey, MotorSlot>,
    seen_fields: HashSet<String>,
}

impl Default for MotorAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_THRESHOLD)
    }
}

impl MotorAggregator {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            slots: HashMap::new(),
            seen_fields: HashSet::new(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Records `value` for `field` on `target` and returns the angles to send.
    ///
    /// `curve` converts the combined value for motors marked `calibrated`.
    /// Paired motors yield both outputs together or nothing.
    pub fn observe<F>(&mut self, target: &MotorTarget, field: &str, value: f32, curve: F) -> Vec<MotorUpdate>
    where
        F: Fn(f32) -> f32,
    {
        if !value.is_finite() {
            trace!(key = %target.key, field, "Ignoring non-finite value");
            return Vec::new();
        }

        let expected = match &target.combination {
            Combination::Summed { fields } => fields.len(),
            _ => 1,
        };
        let slot = self
            .slots
            .entry(target.key.clone())
            .or_insert_with(|| MotorSlot::new(expected, target.partner_key()));

        match &target.combination {
            Combination::Summed { fields } => {
                slot.values.insert(field.to_string(), value);
                if slot.values.len() > fields.len() {
                    slot.values.retain(|name, _| fields.iter().any(|f| f == name));
                }
            }
            _ => {
                slot.values.clear();
                slot.values.insert(field.to_string(), value);
            }
        }
        slot.expected = expected;
        slot.partner = target.partner_key();

        if slot.values.len() < slot.expected {
            trace!(
                key = %target.key,
                seen = slot.values.len(),
                expected = slot.expected,
                "Motor inputs incomplete"
            );
            return Vec::new();
        }

        let combined: f32 = slot.values.values().sum();
        let mut derived = target.transform.apply(combined);
        if target.calibrated {
            derived = curve(derived);
        }
        if !derived.is_finite() {
            trace!(key = %target.key, "Dropping non-finite derived value");
            return Vec::new();
        }
        slot.derived = Some(derived);

        match target.combination {
            Combination::Paired { role, partner } => self.emit_pair(&target.key, role, partner),
            _ => self.emit(&target.key, derived).into_iter().collect(),
        }
    }

    fn emit(&mut self, key: &MotorKey, derived: f32) -> Option<MotorUpdate> {
        let threshold = self.threshold;
        let slot = self.slots.get_mut(key)?;
        let angle = normalize_angle(derived);
        if !exceeds(slot.last_dispatched, angle, threshold) {
            return None;
        }
        slot.last_dispatched = Some(angle);
        Some(MotorUpdate {
            key: key.clone(),
            angle,
        })
    }

    fn emit_pair(&mut self, key: &MotorKey, role: PairRole, partner: MotorId) -> Vec<MotorUpdate> {
        let partner_key = MotorKey::new(key.device_id.clone(), partner);
        let (primary_key, offset_key) = match role {
            PairRole::Primary => (key.clone(), partner_key),
            PairRole::Offset => (partner_key, key.clone()),
        };

        let derived = |k: &MotorKey| self.slots.get(k).and_then(|s| s.derived);
        let (Some(primary), Some(secondary)) = (derived(&primary_key), derived(&offset_key)) else {
            trace!(key = %key, "Paired motor waiting for partner");
            return Vec::new();
        };

        let difference = secondary - primary;
        if !difference.is_finite() {
            trace!(key = %key, "Dropping non-finite pair offset");
            return Vec::new();
        }
        let outputs = [
            (primary_key, normalize_angle(primary)),
            (offset_key, normalize_angle(difference)),
        ];
        let changed = outputs.iter().any(|(k, angle)| {
            let last = self.slots.get(k).and_then(|s| s.last_dispatched);
            exceeds(last, *angle, self.threshold)
        });
        if !changed {
            return Vec::new();
        }

        outputs
            .into_iter()
            .map(|(key, angle)| {
                if let Some(slot) = self.slots.get_mut(&key) {
                    slot.last_dispatched = Some(angle);
                }
                MotorUpdate { key, angle }
            })
            .collect()
    }

    pub fn phase(&self, key: &MotorKey) -> Phase {
        let Some(slot) = self.slots.get(key) else {
            return Phase::Empty;
        };
        if slot.values.is_empty() {
            return Phase::Empty;
        }
        if slot.derived.is_none() {
            return Phase::Partial;
        }
        match &slot.partner {
            Some(partner) if self.slots.get(partner).and_then(|s| s.derived).is_none() => {
                Phase::Partial
            }
            _ => Phase::Ready,
        }
    }

    pub fn last_dispatched(&self, key: &MotorKey) -> Option<f32> {
        self.slots.get(key).and_then(|s| s.last_dispatched)
    }

    /// Returns `key` to [`Phase::Empty`] and forgets its last dispatched angle.
    pub fn reset(&mut self, key: &MotorKey) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// `true` the first time `field` is seen. Once [`MAX_SEEN_FIELDS`]
    /// names are remembered, new names are no longer reported.
    pub fn note_field(&mut self, field: &str) -> bool {
        if self.seen_fields.contains(field) || self.seen_fields.len() >= MAX_SEEN_FIELDS {
            return false;
        }
        self.seen_fields.insert(field.to_string())
    }

    pub fn seen_field_count(&self) -> usize {
        self.seen_fields.len()
    }
}

/// Wraps `value` into `[0, 360)`.
pub fn normalize_angle(value: f32) -> f32 {
    let wrapped = value.rem_euclid(FULL_TURN);
    if wrapped >= FULL_TURN { 0.0 } else { wrapped }
}

/// A missing or non-finite `last` always dispatches.
fn exceeds(last: Option<f32>, angle: f32, threshold: f32) -> bool {
    last.is_none_or(|last| !last.is_finite() || (angle - last).abs() > threshold)
}
