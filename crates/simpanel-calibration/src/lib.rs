//! Dial calibration for SimPanel instruments
//!
//! A calibration table maps a telemetry value (knots, feet, degrees) to the
//! angle a stepper-driven needle must point at. Tables are per device, kept in
//! a [`CalibrationStore`] and persisted through a [`CalibrationRepository`]
//! on every mutation.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod repository;
pub mod store;
pub mod table;

pub use repository::{
    CalibrationRepository, CalibrationSet, InMemoryRepository, JsonFileRepository, LEGACY_DEVICE_ID,
};
pub use store::CalibrationStore;
pub use table::*;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("No calibration for device {0}")]
    DeviceNotFound(String),

    #[error("Calibration point {index} out of range for device {device} ({len} points)")]
    PointIndexOutOfRange {
        device: String,
        index: usize,
        len: usize,
    },

    #[error("Calibration point must be finite (value={value}, angle={angle})")]
    NonFinitePoint { value: f32, angle: f32 },

    #[error("Calibration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed calibration file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize calibrations: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        let err = CalibrationError::DeviceNotFound("ESP_Airspeed".to_string());
        assert_eq!(format!("{}", err), "No calibration for device ESP_Airspeed");

        let err = CalibrationError::PointIndexOutOfRange {
            device: "ESP_VSI".to_string(),
            index: 4,
            len: 2,
        };
        assert_eq!(
            format!("{}", err),
            "Calibration point 4 out of range for device ESP_VSI (2 points)"
        );
    }
}
