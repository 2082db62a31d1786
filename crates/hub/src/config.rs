//! Hub configuration.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simpanel_aggregator::DEFAULT_DEDUP_THRESHOLD;
use simpanel_dref::{DrefEncoder, Marker, Padding};
use tracing::{debug, info, warn};

/// Hub configuration, read from a JSON file.
///
/// Every field has a default, so a partial file (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Address the listeners bind to.
    pub bind_address: IpAddr,
    pub ports: PortConfig,
    pub paths: PathConfig,
    pub liveness: LivenessConfig,
    /// Degrees a motor must move before a new `VALUE` is sent.
    pub dedup_threshold: f32,
    /// Where relayed input values are sent.
    pub simulator: Vec<SimulatorDestination>,
    /// Input panel encoders, keyed by encoder name.
    pub inputs: BTreeMap<String, InputBinding>,
    pub dashboard: DashboardConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ports: PortConfig::default(),
            paths: PathConfig::default(),
            liveness: LivenessConfig::default(),
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            simulator: vec![SimulatorDestination::default()],
            inputs: BTreeMap::new(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl HubConfig {
    /// Loads `path`, falling back to defaults when the file is missing or
    /// malformed.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = ?path, "No config file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to read config, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => {
                debug!(path = ?path, "Loaded config");
                config
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to parse config, using defaults");
                Self::default()
            }
        }
    }

    pub fn listen_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_address, port)
    }
}

/// UDP ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Simulator telemetry in.
    pub telemetry: u16,
    /// Controller heartbeats in.
    pub heartbeat: u16,
    /// Controller command port (destination).
    pub command: u16,
    /// Input panel events in.
    pub input: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            telemetry: 49001,
            heartbeat: 49002,
            command: 49003,
            input: 49004,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub mapping: PathBuf,
    pub calibrations: PathBuf,
    /// Registry snapshot for the dashboard.
    pub devices: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            mapping: PathBuf::from("instrument_mapping.json"),
            calibrations: PathBuf::from("calibrations.json"),
            devices: PathBuf::from("esp_devices.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// A device silent for longer than this is evicted.
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            sweep_interval_secs: 5,
        }
    }
}

impl LivenessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// A simulator receive port and its datagram convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorDestination {
    pub address: SocketAddr,
    pub marker: Marker,
    pub padding: Padding,
}

impl Default for SimulatorDestination {
    fn default() -> Self {
        Self {
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 49000),
            marker: Marker::Outbound,
            padding: Padding::Fixed,
        }
    }
}

impl SimulatorDestination {
    pub fn encoder(&self) -> DrefEncoder {
        DrefEncoder::new(self.marker, self.padding)
    }
}

/// How an encoder's events become a simulator field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    /// Simulator field written with the result.
    pub field: String,
    #[serde(default)]
    pub mode: InputMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Deltas accumulate into a heading in `[0, 360)`.
    #[default]
    Relative,
    /// The event value is sent as is.
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:5000".to_string(),
            timeout_ms: 1000,
        }
    }
}

impl DashboardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
