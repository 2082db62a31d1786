//! Hub error types.

use std::net::SocketAddr;
use std::path::PathBuf;

use simpanel_calibration::CalibrationError;
use simpanel_dref::DrefError;
use simpanel_mapping::MappingError;
use simpanel_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Failed to bind {role} socket on {addr}: {source}")]
    Bind {
        role: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Device snapshot {path:?}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Telemetry encoding error: {0}")]
    Encode(#[from] DrefError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dashboard request failed: {0}")]
    Dashboard(#[from] reqwest::Error),
}

pub type HubResult<T> = Result<T, HubError>;
