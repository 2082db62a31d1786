//! Serialized mapping file format.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{MappingError, MappingResult};

/// Root of the mapping file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMapping {
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentConfig>,
}

impl InstrumentMapping {
    /// Reads and parses a mapping file without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Io`] or [`MappingError::Parse`].
    pub fn from_path(path: &Path) -> MappingResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// One physical instrument: a device and the motors it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(alias = "esp_id")]
    pub device_id: String,
    #[serde(default)]
    pub unit: String,
    /// Values outside this range are dropped before aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<PairConfig>,
    /// Keyed by motor id as a decimal string.
    #[serde(default)]
    pub motors: BTreeMap<String, MotorConfig>,
}

/// Source fields and post-processing for one motor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dref: Option<String>,
    /// Fields whose latest values are summed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drefs: Vec<String>,
    #[serde(default)]
    pub transform: Transform,
    /// Run the value through the device's calibration table.
    #[serde(default)]
    pub calibrated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    None,
    /// Flip the sign before normalization.
    Negate,
}

impl Transform {
    pub fn apply(self, value: f32) -> f32 {
        match self {
            Self::None => value,
            Self::Negate => -value,
        }
    }
}

/// Inclusive range of plausible values for a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub fn accepts(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Two motors of one instrument driven as needle plus offset.
///
/// The `offset` motor is positioned at `secondary - primary`, so a bug or
/// second needle stays relative to the primary card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairConfig {
    pub primary: u8,
    pub offset: u8,
}
