//! Command dispatch to instrument controllers.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use simpanel_protocol::DeviceCommand;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::registry::DeviceRegistry;

/// Result of one send attempt. Delivery is at most once; nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Sent,
    /// The device is not in the registry.
    DeviceUnknown,
    /// The transmit failed.
    Dropped,
}

impl SendOutcome {
    pub fn is_sent(self) -> bool {
        self == Self::Sent
    }
}

#[derive(Debug)]
pub struct CommandDispatcher {
    socket: Arc<UdpSocket>,
    registry: Arc<DeviceRegistry>,
    command_port: u16,
}

impl CommandDispatcher {
    pub fn new(socket: Arc<UdpSocket>, registry: Arc<DeviceRegistry>, command_port: u16) -> Self {
        Self {
            socket,
            registry,
            command_port,
        }
    }

    pub fn command_port(&self) -> u16 {
        self.command_port
    }

    /// Sends `command` to the last known address of `device_id`.
    pub async fn send(&self, device_id: &str, command: &DeviceCommand) -> SendOutcome {
        let Some(ip) = self.registry.address(device_id) else {
            debug!(device_id = %device_id, command = command.keyword(), "Device unknown, command not sent");
            return SendOutcome::DeviceUnknown;
        };
        let target = SocketAddr::new(ip, self.command_port);
        let text = command.to_string();

        match self.socket.send_to(text.as_bytes(), target).await {
            Ok(_) => {
                debug!(device_id = %device_id, target = %target, command = %text, "Command sent");
                SendOutcome::Sent
            }
            Err(e) => {
                warn!(device_id = %device_id, target = %target, error = %e, "Command send failed");
                SendOutcome::Dropped
            }
        }
    }
}
