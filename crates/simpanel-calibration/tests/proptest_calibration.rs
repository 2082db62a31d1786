//! Property-based tests for calibration tables: clamping, monotonicity and the linear default.

#[cfg(test)]
mod proptest_calibration {
    use simpanel_calibration::{
        CalibrationPoint, CalibrationTable, DeviceCalibration, EdgeStrategy, linear_default,
    };
    use proptest::prelude::*;

    /// Strictly ascending values with ascending angles.
    fn rising_points() -> impl Strategy<Value = Vec<CalibrationPoint>> {
        prop::collection::vec((1.0f32..50.0, 0.5f32..40.0), 2..8).prop_map(|steps| {
            let mut value = -100.0f32;
            let mut angle = 0.0f32;
            steps
                .into_iter()
                .map(|(dv, da)| {
                    value += dv;
                    angle += da;
                    CalibrationPoint::new(value, angle)
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn clamp_output_stays_within_endpoint_angles(
            points in rising_points(),
            value in -1000.0f32..1000.0,
        ) {
            let table = CalibrationTable::new(points, EdgeStrategy::Clamp);
            let lo = table.points().first().map(|p| p.angle).unwrap_or_default();
            let hi = table.points().last().map(|p| p.angle).unwrap_or_default();
            let angle = table.angle_for(value);
            prop_assert!(angle >= lo - 1e-3, "{} below {}", angle, lo);
            prop_assert!(angle <= hi + 1e-3, "{} above {}", angle, hi);
        }

        #[test]
        fn rising_table_is_monotonic(
            points in rising_points(),
            a in -1000.0f32..1000.0,
            b in -1000.0f32..1000.0,
        ) {
            for strategy in [EdgeStrategy::Clamp, EdgeStrategy::Extrapolate] {
                let table = CalibrationTable::new(points.clone(), strategy);
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                prop_assert!(table.angle_for(lo) <= table.angle_for(hi) + 1e-2);
            }
        }

        #[test]
        fn strategies_agree_inside_range(points in rising_points(), t in 0.0f32..=1.0) {
            let first = points.first().map(|p| p.value).unwrap_or_default();
            let last = points.last().map(|p| p.value).unwrap_or_default();
            let value = first + (last - first) * t;
            let clamp = CalibrationTable::new(points.clone(), EdgeStrategy::Clamp);
            let extrapolate = CalibrationTable::new(points, EdgeStrategy::Extrapolate);
            prop_assert!((clamp.angle_for(value) - extrapolate.angle_for(value)).abs() < 1e-3);
        }

        #[test]
        fn point_order_does_not_matter(points in rising_points(), value in -200.0f32..400.0) {
            let mut reversed = points.clone();
            reversed.reverse();
            let sorted = DeviceCalibration::new(points);
            let unsorted = DeviceCalibration::new(reversed);
            prop_assert_eq!(&sorted.points, &unsorted.points);
            prop_assert!((sorted.angle_for(value) - unsorted.angle_for(value)).abs() < 1e-4);
        }

        #[test]
        fn linear_default_bounded(value in proptest::num::f32::NORMAL) {
            let angle = linear_default(value);
            prop_assert!((0.0..=360.0).contains(&angle));
        }
    }
}
