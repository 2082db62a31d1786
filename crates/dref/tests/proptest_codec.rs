//! Property-based tests for the DREF codec.

use proptest::prelude::*;
use simpanel_dref::{DrefEncoder, FIXED_FIELD_LEN, HEADER_LEN, Marker, Padding, decode, decode_with};

fn padding_strategy() -> impl Strategy<Value = Padding> {
    prop_oneof![Just(Padding::Terminated), Just(Padding::Fixed)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn round_trip_preserves_field_and_value(
        field in "[A-Za-z0-9_/\\[\\]]{1,120}",
        value in -1.0e6f32..1.0e6f32,
        padding in padding_strategy(),
    ) {
        let datagram = DrefEncoder::new(Marker::Inbound, padding)
            .encode(&field, value)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded = decode(&datagram);
        prop_assert!(decoded.is_some(), "encoded datagram must decode");
        if let Some(msg) = decoded {
            prop_assert_eq!(msg.field, field);
            prop_assert!((msg.value - value).abs() <= f32::EPSILON * value.abs().max(1.0));
        }
    }

    #[test]
    fn outbound_round_trip_needs_outbound_marker(
        field in "[a-z/]{1,40}",
        value in 0.0f32..360.0,
    ) {
        let datagram = DrefEncoder::outbound(Padding::Fixed)
            .encode(&field, value)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(datagram.len(), HEADER_LEN + FIXED_FIELD_LEN);
        prop_assert!(decode(&datagram).is_none());
        prop_assert!(decode_with(Marker::Outbound, &datagram).is_some());
    }

    #[test]
    fn decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..700)) {
        let _decoded = decode(&data);
    }

    #[test]
    fn decode_rejects_wrong_marker(
        prefix in proptest::collection::vec(any::<u8>(), 5),
        tail in proptest::collection::vec(1u8..=127, 5..40),
    ) {
        prop_assume!(prefix.as_slice() != b"DREF+");
        let mut data = prefix;
        data.extend_from_slice(&tail);
        prop_assert!(decode(&data).is_none());
    }
}
