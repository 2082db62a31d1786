//! Codec for the simulator's DREF telemetry datagram.
//!
//! A DREF datagram carries exactly one named telemetry value:
//!
//! ```text
//! +---------+------------------+------------------------------+
//! | marker  | value            | field name                   |
//! | 5 bytes | f32 little-endian| ASCII, NUL padded            |
//! +---------+------------------+------------------------------+
//! ```
//!
//! The simulator sends with the `DREF+` marker and expects `DREF\0` on the
//! way back. Producers disagree on how the field name is padded, so the
//! padding convention is chosen per destination through [`DrefEncoder`].
//!
//! # Example
//!
//! ```
//! use simpanel_dref::{DrefEncoder, Marker, Padding, decode};
//!
//! let encoder = DrefEncoder::new(Marker::Inbound, Padding::Terminated);
//! let datagram = encoder.encode("sim/cockpit/heading", 90.0)?;
//! let message = decode(&datagram).ok_or("not decodable")?;
//! assert_eq!(message.field, "sim/cockpit/heading");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(static_mut_refs)]

pub mod codec;
pub mod error;

pub use codec::{
    DrefEncoder, DrefMessage, FIXED_FIELD_LEN, HEADER_LEN, MARKER_LEN, Marker, Padding, decode,
    decode_with,
};
pub use error::DrefError;

/// A specialized `Result` type for DREF encoding.
pub type DrefResult<T> = Result<T, DrefError>;
