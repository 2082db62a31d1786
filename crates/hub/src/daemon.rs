//! Socket listeners, liveness sweep and signal handling.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::notify::DashboardNotifier;
use crate::service::HubService;

const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Telemetry,
    Heartbeat,
    Input,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Heartbeat => "heartbeat",
            Self::Input => "input",
        }
    }
}

/// Bound listening addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenAddrs {
    pub telemetry: SocketAddr,
    pub heartbeat: SocketAddr,
    pub input: SocketAddr,
}

/// Hub process: one task per inbound channel plus the liveness sweep, all
/// stopped by a broadcast shutdown.
#[derive(Debug)]
pub struct HubDaemon {
    service: Arc<HubService>,
    telemetry: Arc<UdpSocket>,
    heartbeat: Arc<UdpSocket>,
    input: Arc<UdpSocket>,
    shutdown_tx: broadcast::Sender<()>,
}

impl HubDaemon {
    /// Builds the service and binds every listening socket.
    ///
    /// # Errors
    ///
    /// Fails if any socket cannot be bound.
    pub async fn bind(config: HubConfig, notifier: Arc<dyn DashboardNotifier>) -> Result<Self> {
        let ports = config.ports;
        let telemetry = bind_socket(Channel::Telemetry, config.listen_addr(ports.telemetry)).await?;
        let heartbeat = bind_socket(Channel::Heartbeat, config.listen_addr(ports.heartbeat)).await?;
        let input = bind_socket(Channel::Input, config.listen_addr(ports.input)).await?;
        let service = HubService::new(config, notifier)
            .await
            .context("Failed to create hub service")?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            service: Arc::new(service),
            telemetry,
            heartbeat,
            input,
            shutdown_tx,
        })
    }

    /// # Errors
    ///
    /// Fails if a socket's local address cannot be read.
    pub fn local_addrs(&self) -> std::io::Result<ListenAddrs> {
        Ok(ListenAddrs {
            telemetry: self.telemetry.local_addr()?,
            heartbeat: self.heartbeat.local_addr()?,
            input: self.input.local_addr()?,
        })
    }

    pub fn service(&self) -> Arc<HubService> {
        Arc::clone(&self.service)
    }

    /// Sending on the returned channel stops [`HubDaemon::serve`].
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Serves until SIGTERM/SIGINT (Ctrl+C elsewhere). SIGHUP reloads the
    /// mapping.
    ///
    /// # Errors
    ///
    /// See [`HubDaemon::serve`].
    pub async fn run(self) -> Result<()> {
        info!("Starting SimPanel hub");
        let service = self.service();
        let shutdown_tx = self.shutdown_handle();
        tokio::spawn(async move {
            handle_signals(service, shutdown_tx).await;
        });
        self.serve().await
    }

    /// Runs the listeners and the sweep until shutdown, then flushes the
    /// device snapshot.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; task failures are logged.
    pub async fn serve(self) -> Result<()> {
        if let Ok(addrs) = self.local_addrs() {
            info!(
                telemetry = %addrs.telemetry,
                heartbeat = %addrs.heartbeat,
                input = %addrs.input,
                command_port = self.service.config().ports.command,
                "Hub listening"
            );
        }

        let listeners = [
            (Channel::Telemetry, Arc::clone(&self.telemetry)),
            (Channel::Heartbeat, Arc::clone(&self.heartbeat)),
            (Channel::Input, Arc::clone(&self.input)),
        ]
        .map(|(channel, socket)| {
            tokio::spawn(listen(
                channel,
                socket,
                self.service(),
                self.shutdown_tx.subscribe(),
            ))
        });
        let sweeper = tokio::spawn(sweep(self.service(), self.shutdown_tx.subscribe()));

        for handle in listeners.into_iter().chain(std::iter::once(sweeper)) {
            if let Err(e) = handle.await {
                error!(error = %e, "Hub task failed");
            }
        }

        if let Err(e) = self.service.flush() {
            warn!(error = %e, "Failed to flush device snapshot");
        }
        info!("SimPanel hub stopped");
        Ok(())
    }
}

async fn bind_socket(channel: Channel, addr: SocketAddr) -> HubResult<Arc<UdpSocket>> {
    let socket = UdpSocket::bind(addr).await.map_err(|source| HubError::Bind {
        role: channel.as_str(),
        addr,
        source,
    })?;
    Ok(Arc::new(socket))
}

async fn listen(
    channel: Channel,
    socket: Arc<UdpSocket>,
    service: Arc<HubService>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            _ = shutdown.recv() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (len, source) = match received {
            Ok(received) => received,
            Err(e) => {
                warn!(channel = channel.as_str(), error = %e, "UDP receive error");
                continue;
            }
        };
        let Some(datagram) = buf.get(..len) else {
            continue;
        };

        match channel {
            Channel::Telemetry => {
                service.handle_telemetry(datagram).await;
            }
            Channel::Heartbeat => {
                service.handle_heartbeat(datagram, source.ip());
            }
            Channel::Input => {
                service.handle_input(datagram).await;
            }
        }
    }
    debug!(channel = channel.as_str(), "Listener stopped");
}

async fn sweep(service: Arc<HubService>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(service.config().liveness.sweep_interval());
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                service.sweep();
            }
        }
    }
    debug!("Liveness sweep stopped");
}

async fn handle_signals(service: Arc<HubService>, shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let handlers = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::hangup()),
        );
        let (mut sigterm, mut sigint, mut sighup) = match handlers {
            (Ok(term), Ok(int), Ok(hup)) => (term, int, hup),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                error!(error = %e, "Failed to register signal handlers");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading instrument mapping");
                    if let Err(e) = service.reload_mapping() {
                        warn!(error = %e, "Mapping reload failed, keeping current mapping");
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        drop(service);
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Error waiting for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C");
    }

    if shutdown_tx.send(()).is_err() {
        debug!("No tasks left to stop");
    }
}
