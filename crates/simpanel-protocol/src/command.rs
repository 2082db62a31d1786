//! Commands sent to instrument controllers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use simpanel_calibration::{CalibrationPoint, DeviceCalibration};
use simpanel_mapping::MotorId;

use crate::error::{ProtocolError, ProtocolResult, number};

/// One controller command. `Display` renders the wire text.
///
/// Angles travel as whole degrees, truncated toward zero.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// `VALUE:<motor>:<angle>`
    Value { motor: MotorId, angle: f32 },
    /// `MOVE:<motor>:<angle>:<min>:<max>`
    Move {
        motor: MotorId,
        angle: f32,
        min: f32,
        max: f32,
    },
    /// `ZERO:<motor>`
    Zero { motor: MotorId },
    /// `BOUNDS:<motor>:<min>:<max>`
    Bounds { motor: MotorId, min: f32, max: f32 },
    /// `CAL:<json>`
    Cal(String),
}

/// Calibration as the controller expects it in a `CAL:` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPayload {
    pub points: Vec<CalibrationPoint>,
    pub min_angle: f32,
    pub max_angle: f32,
}

impl From<&DeviceCalibration> for CalibrationPayload {
    fn from(calibration: &DeviceCalibration) -> Self {
        Self {
            points: calibration.points.clone(),
            min_angle: calibration.min_angle,
            max_angle: calibration.max_angle,
        }
    }
}

impl DeviceCommand {
    /// `CAL:` command carrying `calibration`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Payload`] if the calibration cannot be serialized.
    pub fn calibration(calibration: &DeviceCalibration) -> ProtocolResult<Self> {
        let payload = CalibrationPayload::from(calibration);
        Ok(Self::Cal(serde_json::to_string(&payload)?))
    }

    /// Keyword at the start of the wire text.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Value { .. } => "VALUE",
            Self::Move { .. } => "MOVE",
            Self::Zero { .. } => "ZERO",
            Self::Bounds { .. } => "BOUNDS",
            Self::Cal(_) => "CAL",
        }
    }

    /// Motor addressed by the command; `CAL` applies to the whole device.
    pub fn motor(&self) -> Option<MotorId> {
        match self {
            Self::Value { motor, .. }
            | Self::Move { motor, .. }
            | Self::Zero { motor }
            | Self::Bounds { motor, .. } => Some(*motor),
            Self::Cal(_) => None,
        }
    }

    /// Decoded payload of a `CAL` command.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Payload`] for malformed JSON, or
    /// [`ProtocolError::UnknownCommand`] for any other command.
    pub fn calibration_payload(&self) -> ProtocolResult<CalibrationPayload> {
        match self {
            Self::Cal(json) => Ok(serde_json::from_str(json)?),
            other => Err(ProtocolError::UnknownCommand(other.keyword().to_string())),
        }
    }
}

/// Whole degrees without a `-0`.
fn whole(angle: f32) -> f32 {
    angle.trunc() + 0.0
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value { motor, angle } => write!(f, "VALUE:{motor}:{}", whole(*angle)),
            Self::Move {
                motor,
                angle,
                min,
                max,
            } => write!(
                f,
                "MOVE:{motor}:{}:{}:{}",
                whole(*angle),
                whole(*min),
                whole(*max)
            ),
            Self::Zero { motor } => write!(f, "ZERO:{motor}"),
            Self::Bounds { motor, min, max } => {
                write!(f, "BOUNDS:{motor}:{}:{}", whole(*min), whole(*max))
            }
            Self::Cal(json) => write!(f, "CAL:{json}"),
        }
    }
}

impl FromStr for DeviceCommand {
    type Err = ProtocolError;

    fn from_str(message: &str) -> Result<Self, Self::Err> {
        let (keyword, rest) = message.split_once(':').unwrap_or((message, ""));
        if keyword == "CAL" {
            return Ok(Self::Cal(rest.to_string()));
        }

        let mut parts = rest.split(':');
        match keyword {
            "VALUE" => Ok(Self::Value {
                motor: number("VALUE", "motor", parts.next())?,
                angle: number("VALUE", "angle", parts.next())?,
            }),
            "MOVE" => Ok(Self::Move {
                motor: number("MOVE", "motor", parts.next())?,
                angle: number("MOVE", "angle", parts.next())?,
                min: number("MOVE", "min", parts.next())?,
                max: number("MOVE", "max", parts.next())?,
            }),
            "ZERO" => Ok(Self::Zero {
                motor: number("ZERO", "motor", parts.next())?,
            }),
            "BOUNDS" => Ok(Self::Bounds {
                motor: number("BOUNDS", "motor", parts.next())?,
                min: number("BOUNDS", "min", parts.next())?,
                max: number("BOUNDS", "max", parts.next())?,
            }),
            _ => Err(ProtocolError::UnknownCommand(message.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_value_truncates() {
        let cmd = DeviceCommand::Value {
            motor: 0,
            angle: 359.6,
        };
        assert_eq!(cmd.to_string(), "VALUE:0:359");

        let cmd = DeviceCommand::Value {
            motor: 1,
            angle: -0.4,
        };
        assert_eq!(cmd.to_string(), "VALUE:1:0");
    }

    #[test]
    fn test_parse_commands() -> TestResult {
        let cmd: DeviceCommand = "MOVE:1:90:0:270".parse()?;
        assert_eq!(
            cmd,
            DeviceCommand::Move {
                motor: 1,
                angle: 90.0,
                min: 0.0,
                max: 270.0
            }
        );
        assert_eq!("ZERO:2".parse::<DeviceCommand>()?.motor(), Some(2));
        assert!(matches!(
            "BOUNDS:0:10".parse::<DeviceCommand>(),
            Err(ProtocolError::MissingField { field: "max", .. })
        ));
        assert!(matches!(
            "VALUE:x:1".parse::<DeviceCommand>(),
            Err(ProtocolError::InvalidNumber { field: "motor", .. })
        ));
        assert!(matches!(
            "SPIN:0".parse::<DeviceCommand>(),
            Err(ProtocolError::UnknownCommand(_))
        ));
        Ok(())
    }

    #[test]
    fn test_cal_payload_roundtrip() -> TestResult {
        let calibration = DeviceCalibration::new(vec![
            CalibrationPoint::new(40.0, 30.0),
            CalibrationPoint::new(200.0, 330.0),
        ])
        .with_angle_limits(10.0, 340.0);

        let cmd = DeviceCommand::calibration(&calibration)?;
        let parsed: DeviceCommand = cmd.to_string().parse()?;
        let payload = parsed.calibration_payload()?;
        assert_eq!(payload, CalibrationPayload::from(&calibration));
        assert_eq!(parsed.motor(), None);
        Ok(())
    }
}
