//! Protocol parse and build errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Datagram is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("Expected a {expected} message, got {message:?}")]
    UnexpectedPrefix {
        expected: &'static str,
        message: String,
    },

    #[error("{kind} message is missing its {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("{kind} message has invalid {field} {value:?}")]
    InvalidNumber {
        kind: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Unknown command {0:?}")]
    UnknownCommand(String),

    #[error("Invalid calibration payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Parses the `field` part of a `kind` message.
pub(crate) fn number<T: std::str::FromStr>(
    kind: &'static str,
    field: &'static str,
    raw: Option<&str>,
) -> ProtocolResult<T> {
    let raw = raw.ok_or(ProtocolError::MissingField { kind, field })?;
    raw.trim().parse().ok().ok_or_else(|| ProtocolError::InvalidNumber {
        kind,
        field,
        value: raw.to_string(),
    })
}
