//! Controller heartbeats.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

const PREFIX: &str = "HEARTBEAT:";

/// Uptime shown for controllers that did not report one.
pub const UNKNOWN_UPTIME: &str = "?";

/// `HEARTBEAT:<deviceId>[:<uptime>]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub device_id: String,
    /// Reported uptime, passed through verbatim.
    pub uptime: Option<String>,
}

impl Heartbeat {
    pub fn new(device_id: impl Into<String>, uptime: Option<String>) -> Self {
        Self {
            device_id: device_id.into(),
            uptime,
        }
    }

    /// # Errors
    ///
    /// [`ProtocolError::UnexpectedPrefix`] for other messages,
    /// [`ProtocolError::MissingField`] when the device id is empty.
    pub fn parse(message: &str) -> ProtocolResult<Self> {
        let Some(rest) = message.strip_prefix(PREFIX) else {
            return Err(ProtocolError::UnexpectedPrefix {
                expected: "HEARTBEAT",
                message: message.to_string(),
            });
        };

        let mut parts = rest.split(':');
        let device_id = parts.next().map(str::trim).unwrap_or_default();
        if device_id.is_empty() {
            return Err(ProtocolError::MissingField {
                kind: "HEARTBEAT",
                field: "device id",
            });
        }
        let uptime = parts
            .next()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(Self::new(device_id, uptime))
    }

    /// # Errors
    ///
    /// See [`Heartbeat::parse`]; also fails on invalid UTF-8.
    pub fn from_datagram(datagram: &[u8]) -> ProtocolResult<Self> {
        Self::parse(crate::datagram_text(datagram)?)
    }

    pub fn uptime_or_unknown(&self) -> &str {
        self.uptime.as_deref().unwrap_or(UNKNOWN_UPTIME)
    }
}

impl std::fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{PREFIX}{}", self.device_id)?;
        if let Some(uptime) = &self.uptime {
            write!(f, ":{uptime}")?;
        }
        Ok(())
    }
}
