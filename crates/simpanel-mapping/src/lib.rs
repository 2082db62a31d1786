//! Instrument mapping for SimPanel
//!
//! Declares which simulator fields drive which motor on which device, and
//! resolves an incoming field name to every motor it feeds.
//!
//! ```
//! use simpanel_mapping::MappingIndex;
//!
//! let index = MappingIndex::from_json(r#"{
//!     "instruments": {
//!         "Heading": {
//!             "esp_id": "ESP_Heading",
//!             "unit": "deg",
//!             "motors": { "0": { "dref": "sim/cockpit2/gauges/indicators/heading_electric_deg_mag_pilot" } }
//!         }
//!     }
//! }"#)?;
//!
//! let targets = index.resolve("sim/cockpit2/gauges/indicators/heading_electric_deg_mag_pilot");
//! assert_eq!(targets.len(), 1);
//! # Ok::<(), simpanel_mapping::MappingError>(())
//! ```

#![deny(static_mut_refs)]

pub mod config;
pub mod index;
pub mod resolver;

pub use config::{InstrumentConfig, InstrumentMapping, MotorConfig, PairConfig, Transform, ValueRange};
pub use index::{Combination, MappingIndex, MotorId, MotorKey, MotorTarget, PairRole};
pub use resolver::SharedResolver;

use std::path::PathBuf;
use thiserror::Error;

/// Mapping load and validation failures.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Mapping file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed mapping: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Instrument {instrument}: motor id {motor:?} is not a number in 0..=255")]
    InvalidMotorId { instrument: String, motor: String },

    #[error("Instrument {instrument} motor {motor}: needs exactly one of `dref` or `drefs`")]
    SourceSelection { instrument: String, motor: MotorId },

    #[error("Instrument {instrument} motor {motor}: empty field name")]
    EmptyFieldName { instrument: String, motor: MotorId },

    #[error("Instrument {instrument} motor {motor}: field {field} listed twice")]
    DuplicateSourceField {
        instrument: String,
        motor: MotorId,
        field: String,
    },

    #[error("Motor {motor_id} of device {device_id} is mapped by more than one instrument")]
    DuplicateMotor { device_id: String, motor_id: MotorId },

    #[error("Instrument {instrument}: invalid pair ({reason})")]
    InvalidPair { instrument: String, reason: String },

    #[error("Instrument {instrument}: value range min {min} exceeds max {max}")]
    InvalidRange { instrument: String, min: f32, max: f32 },

    #[error("Instrument {instrument}: missing device id")]
    MissingDeviceId { instrument: String },
}

pub type MappingResult<T> = Result<T, MappingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MappingError::SourceSelection {
            instrument: "Altimeter".to_string(),
            motor: 2,
        };
        assert_eq!(
            err.to_string(),
            "Instrument Altimeter motor 2: needs exactly one of `dref` or `drefs`"
        );
    }
}
