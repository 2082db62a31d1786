//! Text protocols spoken between the SimPanel hub and instrument controllers
//!
//! Three colon-separated ASCII messages travel over UDP:
//!
//! | Direction           | Message                                   |
//! |---------------------|-------------------------------------------|
//! | controller → hub    | `HEARTBEAT:<deviceId>[:<uptime>]`         |
//! | hub → controller    | `VALUE`, `MOVE`, `ZERO`, `BOUNDS`, `CAL`  |
//! | input panel → hub   | `ENCODER:<name>:<delta>:<button>`         |
//!
//! ```
//! use simpanel_protocol::{DeviceCommand, Heartbeat};
//!
//! let heartbeat = Heartbeat::parse("HEARTBEAT:ESP_Airspeed:5120")?;
//! assert_eq!(heartbeat.device_id, "ESP_Airspeed");
//!
//! let command = DeviceCommand::Value { motor: 0, angle: 359.6 };
//! assert_eq!(command.to_string(), "VALUE:0:359");
//! # Ok::<(), simpanel_protocol::ProtocolError>(())
//! ```

#![deny(static_mut_refs)]

pub mod command;
pub mod encoder;
pub mod error;
pub mod heartbeat;

pub use command::{CalibrationPayload, DeviceCommand};
pub use encoder::EncoderEvent;
pub use error::{ProtocolError, ProtocolResult};
pub use heartbeat::{Heartbeat, UNKNOWN_UPTIME};

/// Decodes a text datagram, dropping trailing NULs and line endings.
///
/// # Errors
///
/// Returns [`ProtocolError::NotUtf8`] for invalid UTF-8.
pub fn datagram_text(datagram: &[u8]) -> ProtocolResult<&str> {
    let text = std::str::from_utf8(datagram)?;
    Ok(text.trim_end_matches(['\0', '\r', '\n', ' ']))
}
