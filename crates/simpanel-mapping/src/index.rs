//! Field-name index over a validated mapping.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{InstrumentConfig, InstrumentMapping, MotorConfig, PairConfig, Transform, ValueRange};
use crate::{MappingError, MappingResult};

pub type MotorId = u8;

/// Addresses one motor on one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MotorKey {
    pub device_id: String,
    pub motor_id: MotorId,
}

impl MotorKey {
    pub fn new(device_id: impl Into<String>, motor_id: MotorId) -> Self {
        Self {
            device_id: device_id.into(),
            motor_id,
        }
    }
}

impl fmt::Display for MotorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.motor_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairRole {
    Primary,
    Offset,
}

/// How a motor's value is derived from its source fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Combination {
    /// The field value itself.
    Single,
    /// Sum of the latest value of every listed field.
    Summed { fields: Vec<String> },
    /// One half of a primary/offset motor pair.
    Paired { role: PairRole, partner: MotorId },
}

/// Everything the aggregator needs to know about one mapped motor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotorTarget {
    pub key: MotorKey,
    pub instrument: String,
    pub unit: String,
    pub combination: Combination,
    pub transform: Transform,
    pub calibrated: bool,
    pub value_range: Option<ValueRange>,
}

impl MotorTarget {
    /// Key of the partner motor for a paired target.
    pub fn partner_key(&self) -> Option<MotorKey> {
        match self.combination {
            Combination::Paired { partner, .. } => {
                Some(MotorKey::new(self.key.device_id.clone(), partner))
            }
            _ => None,
        }
    }
}

/// Immutable lookup from field name to the motors it feeds.
#[derive(Debug, Clone, Default)]
pub struct MappingIndex {
    mapping: InstrumentMapping,
    by_field: HashMap<String, Vec<MotorTarget>>,
    motor_count: usize,
}

impl MappingIndex {
    /// Validates `mapping` and indexes every motor by source field.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] for malformed motor ids, motors without a
    /// unique source selection, broken pair declarations, or two instruments
    /// claiming the same motor.
    pub fn build(mapping: InstrumentMapping) -> MappingResult<Self> {
        let mut by_field: HashMap<String, Vec<MotorTarget>> = HashMap::new();
        let mut claimed: HashSet<MotorKey> = HashSet::new();

        for (name, instrument) in &mapping.instruments {
            validate_instrument(name, instrument)?;
            let motors = parse_motors(name, instrument)?;
            if let Some(pair) = instrument.pair {
                validate_pair(name, pair, &motors)?;
            }

            for (motor_id, config, fields) in motors {
                let key = MotorKey::new(instrument.device_id.clone(), motor_id);
                if !claimed.insert(key.clone()) {
                    return Err(MappingError::DuplicateMotor {
                        device_id: key.device_id,
                        motor_id,
                    });
                }

                let combination = match instrument.pair {
                    Some(pair) if pair.primary == motor_id => Combination::Paired {
                        role: PairRole::Primary,
                        partner: pair.offset,
                    },
                    Some(pair) if pair.offset == motor_id => Combination::Paired {
                        role: PairRole::Offset,
                        partner: pair.primary,
                    },
                    _ if !config.drefs.is_empty() => Combination::Summed {
                        fields: fields.clone(),
                    },
                    _ => Combination::Single,
                };

                let target = MotorTarget {
                    key,
                    instrument: name.clone(),
                    unit: instrument.unit.clone(),
                    combination,
                    transform: config.transform,
                    calibrated: config.calibrated,
                    value_range: instrument.value_range,
                };
                for field in fields {
                    by_field.entry(field).or_default().push(target.clone());
                }
            }
        }

        let motor_count = claimed.len();
        Ok(Self {
            mapping,
            by_field,
            motor_count,
        })
    }

    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json(json: &str) -> MappingResult<Self> {
        Self::build(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Read, parse, or validation failure.
    pub fn from_path(path: &Path) -> MappingResult<Self> {
        Self::build(InstrumentMapping::from_path(path)?)
    }

    /// Loads `path`, falling back to an empty mapping on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::from_path(path) {
            Ok(index) => {
                info!(
                    path = ?path,
                    instruments = index.mapping.instruments.len(),
                    fields = index.by_field.len(),
                    "Loaded instrument mapping"
                );
                index
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to load instrument mapping, starting empty");
                Self::default()
            }
        }
    }

    /// Every motor fed by `field`, in instrument order. Empty if unmapped.
    pub fn resolve(&self, field: &str) -> &[MotorTarget] {
        self.by_field.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn mapping(&self) -> &InstrumentMapping {
        &self.mapping
    }

    /// Device ids the mapping expects to hear from.
    pub fn device_ids(&self) -> BTreeSet<&str> {
        self.mapping
            .instruments
            .values()
            .map(|i| i.device_id.as_str())
            .collect()
    }

    pub fn field_count(&self) -> usize {
        self.by_field.len()
    }

    pub fn motor_count(&self) -> usize {
        self.motor_count
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }
}

type ParsedMotor<'a> = (MotorId, &'a MotorConfig, Vec<String>);

fn validate_instrument(name: &str, instrument: &InstrumentConfig) -> MappingResult<()> {
    if instrument.device_id.trim().is_empty() {
        return Err(MappingError::MissingDeviceId {
            instrument: name.to_string(),
        });
    }
    let Some(range) = instrument.value_range else {
        return Ok(());
    };
    match range.min.partial_cmp(&range.max) {
        Some(Ordering::Less | Ordering::Equal) => Ok(()),
        _ => Err(MappingError::InvalidRange {
            instrument: name.to_string(),
            min: range.min,
            max: range.max,
        }),
    }
}

fn parse_motors<'a>(name: &str, instrument: &'a InstrumentConfig) -> MappingResult<Vec<ParsedMotor<'a>>> {
    instrument
        .motors
        .iter()
        .map(|(raw_id, config)| {
            let Ok(motor_id) = raw_id.trim().parse::<MotorId>() else {
                return Err(MappingError::InvalidMotorId {
                    instrument: name.to_string(),
                    motor: raw_id.clone(),
                });
            };
            let fields = source_fields(name, motor_id, config)?;
            Ok((motor_id, config, fields))
        })
        .collect()
}

fn source_fields(name: &str, motor: MotorId, config: &MotorConfig) -> MappingResult<Vec<String>> {
    let fields = match (&config.dref, config.drefs.as_slice()) {
        (Some(field), []) => vec![field.clone()],
        (None, fields @ [_, ..]) => fields.to_vec(),
        _ => {
            return Err(MappingError::SourceSelection {
                instrument: name.to_string(),
                motor,
            });
        }
    };

    {
        let mut seen = HashSet::new();
        for field in &fields {
            if field.is_empty() {
                return Err(MappingError::EmptyFieldName {
                    instrument: name.to_string(),
                    motor,
                });
            }
            if !seen.insert(field.as_str()) {
                return Err(MappingError::DuplicateSourceField {
                    instrument: name.to_string(),
                    motor,
                    field: field.clone(),
                });
            }
        }
    }

    Ok(fields)
}

fn validate_pair(name: &str, pair: PairConfig, motors: &[ParsedMotor<'_>]) -> MappingResult<()> {
    let invalid = |reason: String| MappingError::InvalidPair {
        instrument: name.to_string(),
        reason,
    };

    if pair.primary == pair.offset {
        return Err(invalid(format!("primary and offset are both motor {}", pair.primary)));
    }
    for id in [pair.primary, pair.offset] {
        match motors.iter().find(|(motor_id, ..)| *motor_id == id) {
            None => return Err(invalid(format!("motor {id} is not declared"))),
            Some((_, config, _)) if !config.drefs.is_empty() => {
                return Err(invalid(format!("motor {id} must use a single `dref`")));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const PANEL: &str = r#"{
        "instruments": {
            "Gyrocompass": {
                "esp_id": "ESP_Gyrocompass",
                "unit": "deg",
                "pair": { "primary": 0, "offset": 1 },
                "motors": {
                    "0": { "dref": "sim/cockpit2/gauges/indicators/compass_heading_deg_mag" },
                    "1": { "dref": "sim/cockpit/autopilot/heading_mag" }
                }
            },
            "Turn": {
                "device_id": "ESP_Turn",
                "unit": "deg",
                "value_range": { "min": -90, "max": 90 },
                "motors": {
                    "0": { "drefs": ["sim/flightmodel/position/phi", "sim/trim/roll"], "transform": "negate" }
                }
            },
            "HeadingRepeater": {
                "device_id": "ESP_Repeater",
                "unit": "deg",
                "motors": {
                    "0": { "dref": "sim/cockpit2/gauges/indicators/compass_heading_deg_mag", "calibrated": true }
                }
            }
        }
    }"#;

    #[test]
    fn test_resolve_single_and_summed() -> TestResult {
        let index = MappingIndex::from_json(PANEL)?;
        let roll = index.resolve("sim/trim/roll");
        assert_eq!(roll.len(), 1);
        let target = roll.first().ok_or("missing target")?;
        assert_eq!(target.key, MotorKey::new("ESP_Turn", 0));
        assert_eq!(target.transform, Transform::Negate);
        assert!(matches!(&target.combination, Combination::Summed { fields } if fields.len() == 2));
        assert_eq!(target.value_range.map(|r| r.min), Some(-90.0));

        assert!(index.resolve("sim/unknown").is_empty());
        assert_eq!(index.motor_count(), 4);
        Ok(())
    }

    #[test]
    fn test_fan_out_to_every_motor() -> TestResult {
        let index = MappingIndex::from_json(PANEL)?;
        let targets = index.resolve("sim/cockpit2/gauges/indicators/compass_heading_deg_mag");
        let keys: Vec<String> = targets.iter().map(|t| t.key.to_string()).collect();
        assert_eq!(keys, vec!["ESP_Gyrocompass/0", "ESP_Repeater/0"]);
        assert!(targets.get(1).is_some_and(|t| t.calibrated));
        Ok(())
    }

    #[test]
    fn test_pair_roles() -> TestResult {
        let index = MappingIndex::from_json(PANEL)?;
        let bug = index.resolve("sim/cockpit/autopilot/heading_mag");
        let target = bug.first().ok_or("missing target")?;
        assert_eq!(
            target.combination,
            Combination::Paired {
                role: PairRole::Offset,
                partner: 0
            }
        );
        assert_eq!(target.partner_key(), Some(MotorKey::new("ESP_Gyrocompass", 0)));
        Ok(())
    }

    #[test]
    fn test_device_ids() -> TestResult {
        let index = MappingIndex::from_json(PANEL)?;
        let ids: Vec<&str> = index.device_ids().into_iter().collect();
        assert_eq!(ids, vec!["ESP_Gyrocompass", "ESP_Repeater", "ESP_Turn"]);
        Ok(())
    }

    fn build_err(json: &str) -> Option<MappingError> {
        MappingIndex::from_json(json).err()
    }

    #[test]
    fn test_rejects_ambiguous_sources() {
        let both = r#"{"instruments":{"A":{"esp_id":"D","motors":{"0":{"dref":"x","drefs":["y"]}}}}}"#;
        assert!(matches!(build_err(both), Some(MappingError::SourceSelection { motor: 0, .. })));

        let neither = r#"{"instruments":{"A":{"esp_id":"D","motors":{"0":{}}}}}"#;
        assert!(matches!(build_err(neither), Some(MappingError::SourceSelection { .. })));

        let dup = r#"{"instruments":{"A":{"esp_id":"D","motors":{"0":{"drefs":["x","x"]}}}}}"#;
        assert!(matches!(build_err(dup), Some(MappingError::DuplicateSourceField { .. })));
    }

    #[test]
    fn test_rejects_bad_motor_id() {
        let json = r#"{"instruments":{"A":{"esp_id":"D","motors":{"left":{"dref":"x"}}}}}"#;
        assert!(matches!(build_err(json), Some(MappingError::InvalidMotorId { .. })));
    }

    #[test]
    fn test_rejects_bad_pairs() {
        let missing = r#"{"instruments":{"A":{"esp_id":"D","pair":{"primary":0,"offset":1},
            "motors":{"0":{"dref":"x"}}}}}"#;
        assert!(matches!(build_err(missing), Some(MappingError::InvalidPair { .. })));

        let summed = r#"{"instruments":{"A":{"esp_id":"D","pair":{"primary":0,"offset":1},
            "motors":{"0":{"dref":"x"},"1":{"drefs":["y","z"]}}}}}"#;
        assert!(matches!(build_err(summed), Some(MappingError::InvalidPair { .. })));
    }

    #[test]
    fn test_rejects_motor_claimed_twice() {
        let json = r#"{"instruments":{
            "A":{"esp_id":"D","motors":{"0":{"dref":"x"}}},
            "B":{"esp_id":"D","motors":{"0":{"dref":"y"}}}}}"#;
        assert!(matches!(
            build_err(json),
            Some(MappingError::DuplicateMotor { motor_id: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let json = r#"{"instruments":{"A":{"esp_id":"D","value_range":{"min":5,"max":1},
            "motors":{"0":{"dref":"x"}}}}}"#;
        assert!(matches!(build_err(json), Some(MappingError::InvalidRange { .. })));
    }

    #[test]
    fn test_missing_file_falls_back_to_empty() -> TestResult {
        let dir = tempfile::tempdir()?;
        let index = MappingIndex::load_or_default(&dir.path().join("instrument_mapping.json"));
        assert!(index.is_empty());
        Ok(())
    }
}
