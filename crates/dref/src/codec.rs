//! DREF datagram encoding and decoding.

use serde::{Deserialize, Serialize};

use crate::error::DrefError;

/// Length of the datagram marker.
pub const MARKER_LEN: usize = 5;
/// Marker plus the 4-byte value: the shortest significant datagram.
pub const HEADER_LEN: usize = MARKER_LEN + 4;
/// Width of the NUL-padded field slot used by [`Padding::Fixed`].
pub const FIXED_FIELD_LEN: usize = 500;

const INBOUND_MARKER: &[u8; MARKER_LEN] = b"DREF+";
const OUTBOUND_MARKER: &[u8; MARKER_LEN] = b"DREF\0";

/// Datagram marker, selected by direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// `DREF+`, sent by the simulator.
    Inbound,
    /// `DREF\0`, expected by the simulator's receive port.
    #[default]
    Outbound,
}

impl Marker {
    /// Raw marker bytes.
    pub const fn bytes(self) -> &'static [u8; MARKER_LEN] {
        match self {
            Self::Inbound => INBOUND_MARKER,
            Self::Outbound => OUTBOUND_MARKER,
        }
    }
}

/// Field-name padding convention of a destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Field name followed by a single NUL terminator.
    Terminated,
    /// Field name in a [`FIXED_FIELD_LEN`]-byte slot, NUL padded.
    #[default]
    Fixed,
}

/// A decoded telemetry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrefMessage {
    /// Simulator field name, e.g. `sim/cockpit2/gauges/indicators/airspeed_kts_pilot`.
    pub field: String,
    /// Field value.
    pub value: f32,
}

impl DrefMessage {
    pub fn new(field: impl Into<String>, value: f32) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// Decode a datagram sent by the simulator (`DREF+` marker).
///
/// Returns `None` when the datagram is not decodable: fewer than
/// [`HEADER_LEN`] significant bytes, a mismatched marker, or an empty field
/// name once trailing NUL padding is stripped.
pub fn decode(datagram: &[u8]) -> Option<DrefMessage> {
    decode_with(Marker::Inbound, datagram)
}

/// Decode a datagram carrying the given marker.
///
/// Non-ASCII bytes in the field name are replaced with `U+FFFD`.
pub fn decode_with(marker: Marker, datagram: &[u8]) -> Option<DrefMessage> {
    let significant = trim_trailing_nul(datagram);
    let (head, name) = significant.split_at_checked(HEADER_LEN)?;
    let (prefix, value_bytes) = head.split_at_checked(MARKER_LEN)?;
    if prefix != marker.bytes() {
        return None;
    }

    let value = f32::from_le_bytes(value_bytes.try_into().ok()?);
    let field = ascii_lossy(name);
    if field.is_empty() {
        return None;
    }

    Some(DrefMessage { field, value })
}

fn trim_trailing_nul(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., 0] = bytes {
        bytes = rest;
    }
    bytes
}

fn ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                char::from(b)
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect()
}

/// Encoder bound to one destination's marker and padding convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrefEncoder {
    marker: Marker,
    padding: Padding,
}

impl DrefEncoder {
    pub const fn new(marker: Marker, padding: Padding) -> Self {
        Self { marker, padding }
    }

    /// Encoder for the simulator's receive port (`DREF\0`).
    pub const fn outbound(padding: Padding) -> Self {
        Self::new(Marker::Outbound, padding)
    }

    pub const fn marker(&self) -> Marker {
        self.marker
    }

    pub const fn padding(&self) -> Padding {
        self.padding
    }

    /// Encode one field value.
    ///
    /// # Errors
    ///
    /// Returns [`DrefError`] when the field name is empty, is not plain ASCII
    /// (NUL included), or does not fit the fixed slot.
    pub fn encode(&self, field: &str, value: f32) -> Result<Vec<u8>, DrefError> {
        if field.is_empty() {
            return Err(DrefError::EmptyField);
        }
        if !field.bytes().all(|b| b.is_ascii() && b != 0) {
            return Err(DrefError::InvalidFieldName {
                field: field.to_string(),
            });
        }

        let name = field.as_bytes();
        let pad = match self.padding {
            Padding::Terminated => 1,
            Padding::Fixed => {
                let max = FIXED_FIELD_LEN.saturating_sub(1);
                if name.len() > max {
                    return Err(DrefError::FieldTooLong {
                        len: name.len(),
                        max,
                    });
                }
                FIXED_FIELD_LEN.saturating_sub(name.len())
            }
        };

        let mut datagram = Vec::with_capacity(HEADER_LEN.saturating_add(name.len()).saturating_add(pad));
        datagram.extend_from_slice(self.marker.bytes());
        datagram.extend_from_slice(&value.to_le_bytes());
        datagram.extend_from_slice(name);
        datagram.resize(datagram.len().saturating_add(pad), 0);
        Ok(datagram)
    }

    /// Encode a [`DrefMessage`].
    ///
    /// # Errors
    ///
    /// See [`DrefEncoder::encode`].
    pub fn encode_message(&self, message: &DrefMessage) -> Result<Vec<u8>, DrefError> {
        self.encode(&message.field, message.value)
    }
}
