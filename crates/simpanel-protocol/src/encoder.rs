//! Rotary encoder events from the input panel.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult, number};

const PREFIX: &str = "ENCODER:";

/// `ENCODER:<name>:<signedDelta>:<buttonState>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderEvent {
    pub name: String,
    pub delta: i32,
    /// Button state as sent, e.g. `PRESSED` or `released`.
    pub button: String,
}

impl EncoderEvent {
    /// # Errors
    ///
    /// Fails on another message kind, a missing name or button, or a
    /// non-integer delta.
    pub fn parse(message: &str) -> ProtocolResult<Self> {
        let Some(rest) = message.strip_prefix(PREFIX) else {
            return Err(ProtocolError::UnexpectedPrefix {
                expected: "ENCODER",
                message: message.to_string(),
            });
        };

        let mut parts = rest.split(':');
        let name = parts.next().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(ProtocolError::MissingField {
                kind: "ENCODER",
                field: "name",
            });
        }
        let delta = number("ENCODER", "delta", parts.next())?;
        let button = parts
            .next()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or(ProtocolError::MissingField {
                kind: "ENCODER",
                field: "button state",
            })?;

        Ok(Self {
            name: name.to_string(),
            delta,
            button: button.to_string(),
        })
    }

    /// # Errors
    ///
    /// See [`EncoderEvent::parse`]; also fails on invalid UTF-8.
    pub fn from_datagram(datagram: &[u8]) -> ProtocolResult<Self> {
        Self::parse(crate::datagram_text(datagram)?)
    }

    pub fn is_pressed(&self) -> bool {
        self.button.eq_ignore_ascii_case("pressed")
    }
}

impl std::fmt::Display for EncoderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{PREFIX}{}:{}:{}", self.name, self.delta, self.button)
    }
}
