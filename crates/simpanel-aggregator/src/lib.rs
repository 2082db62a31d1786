//! Motor value aggregation for SimPanel
//!
//! Turns resolved field observations into needle angles: sums multi-field
//! motors once every field has been seen, combines paired motors, applies
//! the motor's transform and optional calibration curve, normalizes into
//! `[0, 360)`, and suppresses updates that move less than the dedup
//! threshold.

#![deny(static_mut_refs)]

pub mod aggregator;

pub use aggregator::{
    DEFAULT_DEDUP_THRESHOLD, MAX_SEEN_FIELDS, MotorAggregator, MotorUpdate, Phase, normalize_angle,
};
