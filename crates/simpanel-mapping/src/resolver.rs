//! Hot-reloadable resolver shared by the telemetry path and the dashboard API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::index::{MappingIndex, MotorTarget};
use crate::MappingResult;

/// Current [`MappingIndex`], swapped as a whole on reload.
///
/// Readers take an `Arc` snapshot and never block a reload for longer than
/// the pointer copy.
#[derive(Debug)]
pub struct SharedResolver {
    path: Option<PathBuf>,
    current: RwLock<Arc<MappingIndex>>,
}

impl SharedResolver {
    /// Resolver over a fixed index; [`reload`](Self::reload) is a no-op.
    pub fn new(index: MappingIndex) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// Resolver backed by a mapping file. A missing or invalid file yields an
    /// empty mapping until the next successful reload.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let index = MappingIndex::load_or_default(&path);
        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(index)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Arc<MappingIndex> {
        Arc::clone(&self.current.read())
    }

    /// Owned copy of the targets fed by `field`.
    pub fn resolve(&self, field: &str) -> Vec<MotorTarget> {
        self.snapshot().resolve(field).to_vec()
    }

    pub fn replace(&self, index: MappingIndex) {
        *self.current.write() = Arc::new(index);
    }

    /// Re-reads the mapping file and swaps it in.
    ///
    /// # Errors
    ///
    /// Returns the load or validation error; the previous mapping stays active.
    pub fn reload(&self) -> MappingResult<Arc<MappingIndex>> {
        let Some(path) = &self.path else {
            debug!("Mapping has no backing file, nothing to reload");
            return Ok(self.snapshot());
        };

        let index = Arc::new(MappingIndex::from_path(path)?);
        *self.current.write() = Arc::clone(&index);
        info!(
            path = ?path,
            fields = index.field_count(),
            motors = index.motor_count(),
            "Reloaded instrument mapping"
        );
        Ok(index)
    }
}

impl Default for SharedResolver {
    fn default() -> Self {
        Self::new(MappingIndex::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const V1: &str = r#"{"instruments":{"Airspeed":{"esp_id":"ESP_Airspeed","unit":"kts",
        "motors":{"0":{"dref":"sim/airspeed"}}}}}"#;
    const V2: &str = r#"{"instruments":{"Airspeed":{"esp_id":"ESP_Airspeed","unit":"kts",
        "motors":{"0":{"dref":"sim/airspeed_true"}}}}}"#;

    #[test]
    fn test_reload_swaps_index() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("instrument_mapping.json");
        std::fs::write(&path, V1)?;

        let resolver = SharedResolver::from_path(&path);
        assert_eq!(resolver.resolve("sim/airspeed").len(), 1);
        let before = resolver.snapshot();

        std::fs::write(&path, V2)?;
        resolver.reload()?;
        assert!(resolver.resolve("sim/airspeed").is_empty());
        assert_eq!(resolver.resolve("sim/airspeed_true").len(), 1);
        // Snapshots taken earlier keep the old view.
        assert_eq!(before.resolve("sim/airspeed").len(), 1);
        Ok(())
    }

    #[test]
    fn test_failed_reload_keeps_previous() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("instrument_mapping.json");
        std::fs::write(&path, V1)?;
        let resolver = SharedResolver::from_path(&path);

        std::fs::write(&path, "{ broken")?;
        assert!(resolver.reload().is_err());
        assert_eq!(resolver.resolve("sim/airspeed").len(), 1);
        Ok(())
    }

    #[test]
    fn test_reload_without_file_is_noop() -> TestResult {
        let resolver = SharedResolver::new(MappingIndex::from_json(V1)?);
        let index = resolver.reload()?;
        assert_eq!(index.field_count(), 1);
        Ok(())
    }
}
