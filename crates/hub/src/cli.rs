//! Command-line arguments for `panelhubd`.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::HubConfig;

/// Default `tracing` filter when neither `RUST_LOG` nor `--log-level` is set.
pub const DEFAULT_LOG_FILTER: &str = "simpanel_hub=info,info";

#[derive(Debug, Parser)]
#[command(name = "panelhubd")]
#[command(about = "Routes flight simulator telemetry to SimPanel instrument controllers")]
#[command(version)]
pub struct Cli {
    /// Hub configuration file (JSON)
    #[arg(short, long, env = "PANELHUB_CONFIG", default_value = "panelhub.json")]
    pub config: PathBuf,

    /// Log filter, e.g. `debug` or `simpanel_hub=trace`
    #[arg(long, env = "PANELHUB_LOG")]
    pub log_level: Option<String>,

    /// Address to bind listeners on
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Simulator telemetry port
    #[arg(long)]
    pub telemetry_port: Option<u16>,

    /// Controller heartbeat port
    #[arg(long)]
    pub heartbeat_port: Option<u16>,

    /// Controller command port
    #[arg(long)]
    pub command_port: Option<u16>,

    /// Input panel port
    #[arg(long)]
    pub input_port: Option<u16>,

    /// Instrument mapping file
    #[arg(long)]
    pub mapping: Option<PathBuf>,

    /// Calibration file
    #[arg(long)]
    pub calibrations: Option<PathBuf>,

    /// Device snapshot file
    #[arg(long)]
    pub devices: Option<PathBuf>,

    /// Do not post notifications to the dashboard
    #[arg(long)]
    pub no_dashboard: bool,
}

impl Cli {
    pub fn log_filter(&self) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }

    /// Loads the config file and applies command-line overrides.
    pub fn load_config(&self) -> HubConfig {
        let mut config = HubConfig::load(&self.config);
        self.apply(&mut config);
        config
    }

    pub fn apply(&self, config: &mut HubConfig) {
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        let ports = &mut config.ports;
        for (value, slot) in [
            (self.telemetry_port, &mut ports.telemetry),
            (self.heartbeat_port, &mut ports.heartbeat),
            (self.command_port, &mut ports.command),
            (self.input_port, &mut ports.input),
        ] {
            if let Some(port) = value {
                *slot = port;
            }
        }
        let paths = &mut config.paths;
        for (value, slot) in [
            (&self.mapping, &mut paths.mapping),
            (&self.calibrations, &mut paths.calibrations),
            (&self.devices, &mut paths.devices),
        ] {
            if let Some(path) = value {
                slot.clone_from(path);
            }
        }
        if self.no_dashboard {
            config.dashboard.enabled = false;
        }
    }
}
