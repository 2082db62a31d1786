//! SimPanel hub - routes flight simulator telemetry to networked instrument
//! controllers
//!
//! The hub listens on three UDP channels:
//!
//! | Channel   | Default port | Payload                                   |
//! |-----------|--------------|-------------------------------------------|
//! | telemetry | 49001        | binary `DREF+` messages from the simulator |
//! | heartbeat | 49002        | `HEARTBEAT:<id>[:<uptime>]`                |
//! | input     | 49004        | `ENCODER:<name>:<delta>:<button>`          |
//!
//! Telemetry is resolved against the instrument mapping, aggregated per
//! motor and sent to the owning controller's command port (49003) as
//! `VALUE:<motor>:<angle>`. Input events are written back to the simulator.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]

pub mod api;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod error;
pub mod notify;
pub mod registry;
pub mod relay;
pub mod router;
pub mod service;
pub mod stats;

pub use api::{DashboardApi, DeviceStatus};
pub use config::{HubConfig, InputBinding, InputMode, SimulatorDestination};
pub use daemon::{HubDaemon, ListenAddrs};
pub use dispatcher::{CommandDispatcher, SendOutcome};
pub use error::{HubError, HubResult};
pub use notify::{
    ChannelNotifier, DashboardNotifier, EncoderNotice, HttpNotifier, Notice, NullNotifier,
    TelemetryNotice, notifier_for,
};
pub use registry::{DeviceRecord, DeviceRegistry, SnapshotEntry};
pub use relay::{InputRelay, RelayedValue};
pub use router::{RoutedUpdate, TelemetryRouter};
pub use service::HubService;
pub use stats::{FieldSnapshot, MAX_TRACKED_FIELDS, TelemetryStats};
