//! Shared, persisted calibration store.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::repository::{CalibrationRepository, CalibrationSet};
use crate::table::{CalibrationPoint, DeviceCalibration, linear_default};
use crate::{CalibrationError, CalibrationResult};

/// Per-device calibrations, readable from every telemetry path.
///
/// Mutations are serialized, applied to a copy, persisted, and only then
/// published; interpolation reads never see a half-applied change and the
/// in-memory state never runs ahead of what was saved.
pub struct CalibrationStore {
    tables: RwLock<CalibrationSet>,
    repository: Arc<dyn CalibrationRepository>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for CalibrationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationStore")
            .field("devices", &self.tables.read().len())
            .finish_non_exhaustive()
    }
}

impl CalibrationStore {
    /// Loads every calibration from `repository`.
    ///
    /// A repository that cannot be read leaves the store empty; the hub keeps
    /// running on the linear default.
    pub fn load(repository: Arc<dyn CalibrationRepository>) -> Self {
        let tables = match repository.load_all() {
            Ok(set) => {
                info!(devices = set.len(), "Loaded calibrations");
                set
            }
            Err(e) => {
                warn!(error = %e, "Failed to load calibrations, starting empty");
                CalibrationSet::new()
            }
        };

        Self {
            tables: RwLock::new(tables),
            repository,
            write_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceCalibration> {
        self.tables.read().get(device_id).cloned()
    }

    pub fn all(&self) -> CalibrationSet {
        self.tables.read().clone()
    }

    /// Needle angle for `value` on `device_id`'s dial.
    ///
    /// Devices without a stored calibration use the linear default.
    pub fn angle_for(&self, device_id: &str, value: f32) -> f32 {
        match self.tables.read().get(device_id) {
            Some(calibration) => calibration.angle_for(value),
            None => linear_default(value),
        }
    }

    /// Replaces a device's calibration.
    ///
    /// # Errors
    ///
    /// Fails on non-finite points or when persisting fails; the previous
    /// calibration stays in effect in both cases.
    pub fn set(
        &self,
        device_id: &str,
        calibration: DeviceCalibration,
    ) -> CalibrationResult<DeviceCalibration> {
        self.mutate(device_id, |current| {
            let DeviceCalibration {
                points,
                min_angle,
                max_angle,
                strategy,
            } = calibration;
            let mut next = DeviceCalibration::default()
                .with_angle_limits(min_angle, max_angle)
                .with_strategy(strategy);
            next.set_points(points)?;
            *current = next;
            Ok(())
        })
    }

    /// Adds a breakpoint, creating the device's calibration if needed.
    ///
    /// # Errors
    ///
    /// Fails on a non-finite point or when persisting fails.
    pub fn add_point(
        &self,
        device_id: &str,
        point: CalibrationPoint,
    ) -> CalibrationResult<DeviceCalibration> {
        self.mutate(device_id, |current| current.add_point(point))
    }

    /// Removes the breakpoint at `index`.
    ///
    /// # Errors
    ///
    /// [`CalibrationError::DeviceNotFound`] if the device has no calibration,
    /// [`CalibrationError::PointIndexOutOfRange`] for a bad index, or a
    /// persistence error.
    pub fn delete_point(&self, device_id: &str, index: usize) -> CalibrationResult<CalibrationPoint> {
        if !self.tables.read().contains_key(device_id) {
            return Err(CalibrationError::DeviceNotFound(device_id.to_string()));
        }

        let mut removed = None;
        self.mutate(device_id, |current| {
            let len = current.points.len();
            removed = current.delete_point(index);
            if removed.is_none() {
                return Err(CalibrationError::PointIndexOutOfRange {
                    device: device_id.to_string(),
                    index,
                    len,
                });
            }
            Ok(())
        })?;

        removed.ok_or_else(|| CalibrationError::DeviceNotFound(device_id.to_string()))
    }

    fn mutate<F>(&self, device_id: &str, apply: F) -> CalibrationResult<DeviceCalibration>
    where
        F: FnOnce(&mut DeviceCalibration) -> CalibrationResult<()>,
    {
        let _serialized = self.write_lock.lock();

        let mut next = self.tables.read().clone();
        let entry = next.entry(device_id.to_string()).or_default();
        apply(entry)?;
        let updated = entry.clone();

        self.repository.save_all(&next)?;
        *self.tables.write() = next;

        info!(
            device_id = %device_id,
            points = updated.points.len(),
            "Calibration updated"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn store() -> (Arc<InMemoryRepository>, CalibrationStore) {
        let repo = Arc::new(InMemoryRepository::new());
        let store = CalibrationStore::load(repo.clone());
        (repo, store)
    }

    #[test]
    fn test_unknown_device_uses_linear_default() {
        let (_, store) = store();
        assert!((store.angle_for("ESP_Airspeed", 50.0) - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_add_point_persists() -> TestResult {
        let (repo, store) = store();
        store.add_point("ESP_Airspeed", CalibrationPoint::new(40.0, 30.0))?;
        store.add_point("ESP_Airspeed", CalibrationPoint::new(200.0, 330.0))?;

        assert_eq!(repo.save_count(), 2);
        assert_eq!(
            repo.stored().get("ESP_Airspeed").map(|c| c.points.len()),
            Some(2)
        );
        assert!((store.angle_for("ESP_Airspeed", 120.0) - 180.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_set_sorts_points() -> TestResult {
        let (_, store) = store();
        let updated = store.set(
            "ESP_Altitude",
            DeviceCalibration {
                points: vec![
                    CalibrationPoint::new(1000.0, 36.0),
                    CalibrationPoint::new(0.0, 0.0),
                ],
                min_angle: 0.0,
                max_angle: 350.0,
                strategy: crate::EdgeStrategy::Extrapolate,
            },
        )?;
        assert_eq!(updated.points.first().map(|p| p.value), Some(0.0));
        assert!((store.angle_for("ESP_Altitude", 2000.0) - 72.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_delete_point_errors() -> TestResult {
        let (repo, store) = store();
        assert!(matches!(
            store.delete_point("nobody", 0),
            Err(CalibrationError::DeviceNotFound(_))
        ));

        store.add_point("ESP_VSI", CalibrationPoint::new(0.0, 180.0))?;
        assert!(matches!(
            store.delete_point("ESP_VSI", 3),
            Err(CalibrationError::PointIndexOutOfRange { index: 3, len: 1, .. })
        ));
        assert_eq!(repo.save_count(), 1);

        let removed = store.delete_point("ESP_VSI", 0)?;
        assert!((removed.angle - 180.0).abs() < f32::EPSILON);
        assert_eq!(store.get("ESP_VSI").map(|c| c.points.len()), Some(0));
        Ok(())
    }

    #[test]
    fn test_rejected_mutation_leaves_table_unchanged() -> TestResult {
        let (repo, store) = store();
        store.add_point("ESP_Turn", CalibrationPoint::new(0.0, 180.0))?;
        let result = store.add_point("ESP_Turn", CalibrationPoint::new(f32::INFINITY, 0.0));
        assert!(result.is_err());
        assert_eq!(store.get("ESP_Turn").map(|c| c.points.len()), Some(1));
        assert_eq!(repo.save_count(), 1);
        Ok(())
    }
}
