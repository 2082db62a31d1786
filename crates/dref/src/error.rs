//! DREF encoding errors.

use thiserror::Error;

/// Errors raised while encoding a DREF datagram.
///
/// Decoding never fails with an error: a datagram that does not match the
/// layout is simply not decodable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrefError {
    /// The field name is empty.
    #[error("DREF field name is empty")]
    EmptyField,

    /// The field name contains non-ASCII or NUL bytes.
    #[error("DREF field name {field:?} must be ASCII without NUL bytes")]
    InvalidFieldName {
        /// Offending field name.
        field: String,
    },

    /// The field name does not fit the fixed-width slot.
    #[error("DREF field name is {len} bytes, fixed slot holds at most {max}")]
    FieldTooLong {
        /// Length of the field name in bytes.
        len: usize,
        /// Longest name the slot accepts (one byte is kept for the terminator).
        max: usize,
    },
}
