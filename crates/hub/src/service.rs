//! The hub's shared state and per-channel entry points.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use simpanel_aggregator::MotorAggregator;
use simpanel_calibration::{CalibrationStore, JsonFileRepository};
use simpanel_mapping::SharedResolver;
use simpanel_protocol::Heartbeat;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::api::DashboardApi;
use crate::config::HubConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::{HubError, HubResult};
use crate::notify::{DashboardNotifier, Notifications};
use crate::registry::DeviceRegistry;
use crate::relay::{InputRelay, RelayedValue};
use crate::router::{RoutedUpdate, TelemetryRouter};
use crate::stats::TelemetryStats;

/// Owns every component and handles one datagram at a time per channel.
///
/// Socket I/O lives in [`crate::daemon::HubDaemon`]; this type can be driven
/// directly from tests.
#[derive(Debug)]
pub struct HubService {
    config: HubConfig,
    registry: Arc<DeviceRegistry>,
    router: TelemetryRouter,
    relay: InputRelay,
    api: DashboardApi,
}

impl HubService {
    /// Loads mapping and calibrations and binds the outbound socket.
    ///
    /// # Errors
    ///
    /// Fails only if the outbound socket cannot be bound; unreadable mapping
    /// or calibration files leave those components empty.
    pub async fn new(config: HubConfig, notifier: Arc<dyn DashboardNotifier>) -> HubResult<Self> {
        let outbound_addr = SocketAddr::new(config.bind_address, 0);
        let socket = UdpSocket::bind(outbound_addr)
            .await
            .map_err(|source| HubError::Bind {
                role: "outbound",
                addr: outbound_addr,
                source,
            })?;
        Ok(Self::with_socket(config, notifier, Arc::new(socket)))
    }

    /// Builds the service around an already bound outbound socket.
    pub fn with_socket(
        config: HubConfig,
        notifier: Arc<dyn DashboardNotifier>,
        socket: Arc<UdpSocket>,
    ) -> Self {
        let registry = Arc::new(
            DeviceRegistry::new(config.liveness.timeout()).with_snapshot(&config.paths.devices),
        );
        let resolver = Arc::new(SharedResolver::from_path(&config.paths.mapping));
        let calibrations = Arc::new(CalibrationStore::load(Arc::new(JsonFileRepository::new(
            &config.paths.calibrations,
        ))));
        let stats = Arc::new(TelemetryStats::new());
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&socket),
            Arc::clone(&registry),
            config.ports.command,
        ));
        let notifications = Notifications::new(notifier);

        let index = resolver.snapshot();
        info!(
            instruments = index.mapping().instruments.len(),
            fields = index.field_count(),
            motors = index.motor_count(),
            "Instrument mapping ready"
        );

        let router = TelemetryRouter::new(
            Arc::clone(&resolver),
            Arc::clone(&calibrations),
            MotorAggregator::new(config.dedup_threshold),
            Arc::clone(&stats),
            Arc::clone(&dispatcher),
            notifications.clone(),
        );
        let relay = InputRelay::new(
            config.inputs.clone(),
            config.simulator.clone(),
            socket,
            notifications,
        );
        let api = DashboardApi::new(
            Arc::clone(&registry),
            resolver,
            calibrations,
            stats,
            dispatcher,
        );

        Self {
            config,
            registry,
            router,
            relay,
            api,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &TelemetryRouter {
        &self.router
    }

    pub fn relay(&self) -> &InputRelay {
        &self.relay
    }

    pub fn api(&self) -> &DashboardApi {
        &self.api
    }

    /// Registers the sender of a heartbeat datagram.
    pub fn handle_heartbeat(&self, datagram: &[u8], source: IpAddr) -> Option<Heartbeat> {
        match Heartbeat::from_datagram(datagram) {
            Ok(heartbeat) => {
                self.registry.record_heartbeat(&heartbeat, source);
                Some(heartbeat)
            }
            Err(e) => {
                warn!(source = %source, error = %e, "Malformed heartbeat");
                None
            }
        }
    }

    pub async fn handle_telemetry(&self, datagram: &[u8]) -> Vec<RoutedUpdate> {
        self.router.handle_datagram(datagram).await
    }

    pub async fn handle_input(&self, datagram: &[u8]) -> Option<RelayedValue> {
        self.relay.handle_datagram(datagram).await
    }

    /// Evicts silent devices.
    pub fn sweep(&self) -> Vec<String> {
        self.registry.sweep()
    }

    /// Re-reads the mapping file and forgets accumulated motor state.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not validate; the current
    /// mapping and motor state are kept.
    pub fn reload_mapping(&self) -> HubResult<()> {
        self.api.reload_mapping()?;
        self.router.reset();
        Ok(())
    }

    /// Writes the device snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Snapshot`] when the file cannot be written.
    pub fn flush(&self) -> HubResult<()> {
        self.registry.persist()
    }
}
