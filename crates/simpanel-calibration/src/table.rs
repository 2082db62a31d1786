//! Calibration type definitions

use serde::{Deserialize, Serialize};

use crate::{CalibrationError, CalibrationResult};

/// Degrees per telemetry unit used when a device has no breakpoints.
pub const DEFAULT_DEGREES_PER_UNIT: f32 = 1.8;

/// Full needle sweep in degrees.
pub const FULL_SWEEP_DEG: f32 = 360.0;

/// Calibration breakpoint
///
/// Pins a telemetry value to the needle angle measured on the physical dial.
///
/// # Examples
///
/// ```
/// use simpanel_calibration::CalibrationPoint;
///
/// let point = CalibrationPoint::new(110.0, 180.0);
/// assert!((point.angle - 180.0).abs() < f32::EPSILON);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Telemetry value in instrument units.
    pub value: f32,
    /// Needle angle in degrees.
    pub angle: f32,
}

impl CalibrationPoint {
    pub fn new(value: f32, angle: f32) -> Self {
        Self { value, angle }
    }

    fn validate(&self) -> CalibrationResult<()> {
        if self.value.is_finite() && self.angle.is_finite() {
            Ok(())
        } else {
            Err(CalibrationError::NonFinitePoint {
                value: self.value,
                angle: self.angle,
            })
        }
    }
}

/// Behaviour outside the outermost breakpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStrategy {
    /// Hold the nearest endpoint's angle.
    #[default]
    Clamp,
    /// Continue the line through the two nearest breakpoints.
    Extrapolate,
}

/// Piecewise-linear value-to-angle table.
///
/// Breakpoints are kept sorted ascending by value with unique values.
///
/// # Examples
///
/// ```
/// use simpanel_calibration::{CalibrationPoint, CalibrationTable, EdgeStrategy};
///
/// let table = CalibrationTable::new(
///     vec![
///         CalibrationPoint::new(70.0, 90.0),
///         CalibrationPoint::new(110.0, 180.0),
///         CalibrationPoint::new(165.0, 270.0),
///     ],
///     EdgeStrategy::Clamp,
/// );
/// assert!((table.angle_for(90.0) - 135.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
    strategy: EdgeStrategy,
}

impl CalibrationTable {
    /// Builds a table, sorting the breakpoints and dropping duplicate values
    /// (the first occurrence wins).
    pub fn new(mut points: Vec<CalibrationPoint>, strategy: EdgeStrategy) -> Self {
        sort_points(&mut points);
        Self { points, strategy }
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn strategy(&self) -> EdgeStrategy {
        self.strategy
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Converts a telemetry value to a needle angle.
    ///
    /// With no breakpoints the linear default
    /// `clamp(value * 1.8, 0, 360)` applies.
    pub fn angle_for(&self, value: f32) -> f32 {
        let points = self.points.as_slice();
        let (first, last) = match points {
            [] => return linear_default(value),
            [only] => return only.angle,
            [first, .., last] => (first, last),
        };

        if value <= first.value {
            return match (self.strategy, points) {
                (EdgeStrategy::Extrapolate, [p1, p2, ..]) => interpolate(p1, p2, value),
                _ => first.angle,
            };
        }
        if value >= last.value {
            return match (self.strategy, points) {
                (EdgeStrategy::Extrapolate, [.., p1, p2]) => interpolate(p1, p2, value),
                _ => last.angle,
            };
        }

        points
            .windows(2)
            .find_map(|pair| match pair {
                [p1, p2] if value >= p1.value && value <= p2.value => {
                    Some(interpolate(p1, p2, value))
                }
                _ => None,
            })
            .unwrap_or(last.angle)
    }
}

/// `clamp(value * 1.8, 0, 360)`, the response of an uncalibrated dial.
pub fn linear_default(value: f32) -> f32 {
    (value * DEFAULT_DEGREES_PER_UNIT).clamp(0.0, FULL_SWEEP_DEG)
}

fn interpolate(p1: &CalibrationPoint, p2: &CalibrationPoint, value: f32) -> f32 {
    let span = p2.value - p1.value;
    if span.abs() < f32::EPSILON {
        return p1.angle;
    }
    p1.angle + (value - p1.value) / span * (p2.angle - p1.angle)
}

fn sort_points(points: &mut Vec<CalibrationPoint>) {
    points.sort_by(|a, b| a.value.total_cmp(&b.value));
    points.dedup_by(|later, earlier| (later.value - earlier.value).abs() < f32::EPSILON);
}

fn default_max_angle() -> f32 {
    FULL_SWEEP_DEG
}

/// Complete device calibration
///
/// The persisted form of one device's dial: breakpoints, the travel limits
/// forwarded to the controller, and the edge strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCalibration {
    /// Breakpoints, sorted ascending by value.
    #[serde(default)]
    pub points: Vec<CalibrationPoint>,
    /// Lowest angle the controller may drive the needle to.
    #[serde(default)]
    pub min_angle: f32,
    /// Highest angle the controller may drive the needle to.
    #[serde(default = "default_max_angle")]
    pub max_angle: f32,
    #[serde(default)]
    pub strategy: EdgeStrategy,
}

impl Default for DeviceCalibration {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            min_angle: 0.0,
            max_angle: FULL_SWEEP_DEG,
            strategy: EdgeStrategy::default(),
        }
    }
}

impl DeviceCalibration {
    pub fn new(points: Vec<CalibrationPoint>) -> Self {
        let mut calibration = Self {
            points,
            ..Self::default()
        };
        sort_points(&mut calibration.points);
        calibration
    }

    pub fn with_strategy(mut self, strategy: EdgeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_angle_limits(mut self, min_angle: f32, max_angle: f32) -> Self {
        self.min_angle = min_angle;
        self.max_angle = max_angle;
        self
    }

    /// Interpolation view over the breakpoints.
    pub fn table(&self) -> CalibrationTable {
        CalibrationTable::new(self.points.clone(), self.strategy)
    }

    pub fn angle_for(&self, value: f32) -> f32 {
        self.table().angle_for(value)
    }

    /// Replaces every breakpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::NonFinitePoint`] if any point is NaN or infinite.
    pub fn set_points(&mut self, points: Vec<CalibrationPoint>) -> CalibrationResult<()> {
        points.iter().try_for_each(CalibrationPoint::validate)?;
        self.points = points;
        sort_points(&mut self.points);
        Ok(())
    }

    /// Inserts a breakpoint, replacing any existing point with the same value.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::NonFinitePoint`] if the point is NaN or infinite.
    pub fn add_point(&mut self, point: CalibrationPoint) -> CalibrationResult<()> {
        point.validate()?;
        self.points
            .retain(|p| (p.value - point.value).abs() >= f32::EPSILON);
        self.points.push(point);
        sort_points(&mut self.points);
        Ok(())
    }

    /// Removes the breakpoint at `index` (in sorted order).
    ///
    /// Returns `None` when the index is out of range.
    pub fn delete_point(&mut self, index: usize) -> Option<CalibrationPoint> {
        (index < self.points.len()).then(|| self.points.remove(index))
    }

    /// Re-sorts points loaded from disk.
    pub(crate) fn normalize(&mut self) {
        sort_points(&mut self.points);
    }
}
