//! Load/save collaborators for calibration data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{CalibrationError, CalibrationPoint, CalibrationResult, DeviceCalibration};

/// Device that a bare point array (the single-dial file layout) belongs to.
pub const LEGACY_DEVICE_ID: &str = "ESP_Airspeed";

/// Every device's calibration, keyed by device id.
pub type CalibrationSet = BTreeMap<String, DeviceCalibration>;

/// Key-value persistence for calibration data.
///
/// `save_all` always receives the complete set so implementations can
/// replace their backing storage in one step.
pub trait CalibrationRepository: Send + Sync {
    /// Load every stored calibration. A repository with nothing stored yet
    /// returns an empty set.
    fn load_all(&self) -> CalibrationResult<CalibrationSet>;

    /// Replace the stored calibrations with `set`.
    fn save_all(&self, set: &CalibrationSet) -> CalibrationResult<()>;
}

/// JSON file shared with the dashboard, e.g. `calibrations.json`.
///
/// ```json
/// { "ESP_Airspeed": { "points": [{"value": 40, "angle": 30}], "min_angle": 0, "max_angle": 360 } }
/// ```
///
/// A bare `[{"value": .., "angle": ..}]` array is also read, as the table of
/// [`LEGACY_DEVICE_ID`]; the next save rewrites it keyed by device.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CalibrationError {
        CalibrationError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CalibrationRepository for JsonFileRepository {
    fn load_all(&self) -> CalibrationResult<CalibrationSet> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No calibration file yet");
                return Ok(CalibrationSet::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let mut set = match serde_json::from_str::<CalibrationSet>(&content) {
            Ok(set) => set,
            Err(source) => match serde_json::from_str::<Vec<CalibrationPoint>>(&content) {
                Ok(points) => {
                    warn!(
                        path = ?self.path,
                        device_id = LEGACY_DEVICE_ID,
                        points = points.len(),
                        "Calibration file is a bare point array"
                    );
                    CalibrationSet::from([(
                        LEGACY_DEVICE_ID.to_string(),
                        DeviceCalibration::new(points),
                    )])
                }
                Err(_) => {
                    return Err(CalibrationError::Parse {
                        path: self.path.clone(),
                        source,
                    });
                }
            },
        };
        set.values_mut().for_each(DeviceCalibration::normalize);
        Ok(set)
    }

    /// Writes to a temporary sibling and renames it over the target, so a
    /// reader never sees a half-written file.
    fn save_all(&self, set: &CalibrationSet) -> CalibrationResult<()> {
        let content = serde_json::to_string_pretty(set)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, content).map_err(|e| self.io_error(e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;

        debug!(path = ?self.path, devices = set.len(), "Saved calibrations");
        Ok(())
    }
}

/// Repository held in memory; counts saves so tests can assert persistence.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    inner: Mutex<(CalibrationSet, usize)>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(set: CalibrationSet) -> Self {
        Self {
            inner: Mutex::new((set, 0)),
        }
    }

    /// Number of completed `save_all` calls.
    pub fn save_count(&self) -> usize {
        self.inner.lock().1
    }

    pub fn stored(&self) -> CalibrationSet {
        self.inner.lock().0.clone()
    }
}

impl CalibrationRepository for InMemoryRepository {
    fn load_all(&self) -> CalibrationResult<CalibrationSet> {
        Ok(self.stored())
    }

    fn save_all(&self, set: &CalibrationSet) -> CalibrationResult<()> {
        let mut inner = self.inner.lock();
        inner.0 = set.clone();
        inner.1 = inner.1.saturating_add(1);
        Ok(())
    }
}
