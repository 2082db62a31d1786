//! Input panel events back into the simulator.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use simpanel_aggregator::normalize_angle;
use simpanel_protocol::EncoderEvent;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::config::{InputBinding, InputMode, SimulatorDestination};
use crate::notify::{EncoderNotice, Notifications};

/// A field value written to the simulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayedValue {
    pub field: String,
    pub value: f32,
    /// Destinations the datagram was handed to.
    pub sent: usize,
}

#[derive(Debug)]
pub struct InputRelay {
    bindings: BTreeMap<String, InputBinding>,
    accumulators: Mutex<HashMap<String, f32>>,
    destinations: Vec<SimulatorDestination>,
    socket: Arc<UdpSocket>,
    notifications: Notifications,
}

impl InputRelay {
    pub fn new(
        bindings: BTreeMap<String, InputBinding>,
        destinations: Vec<SimulatorDestination>,
        socket: Arc<UdpSocket>,
        notifications: Notifications,
    ) -> Self {
        Self {
            bindings,
            accumulators: Mutex::new(HashMap::new()),
            destinations,
            socket,
            notifications,
        }
    }

    /// Parses and relays one input datagram.
    pub async fn handle_datagram(&self, datagram: &[u8]) -> Option<RelayedValue> {
        match EncoderEvent::from_datagram(datagram) {
            Ok(event) => self.relay(&event).await,
            Err(e) => {
                warn!(error = %e, "Malformed input event");
                None
            }
        }
    }

    /// Forwards `event` to the dashboard and, when the encoder is bound,
    /// writes the resulting value to every simulator destination.
    pub async fn relay(&self, event: &EncoderEvent) -> Option<RelayedValue> {
        self.notifications.encoder(EncoderNotice::from(event));

        let Some((field, value)) = self.apply(event) else {
            debug!(encoder = %event.name, "No binding for encoder");
            return None;
        };

        let mut sent: usize = 0;
        for destination in &self.destinations {
            let datagram = match destination.encoder().encode(&field, value) {
                Ok(datagram) => datagram,
                Err(e) => {
                    warn!(
                        field = %field,
                        target = %destination.address,
                        error = %e,
                        "Cannot encode input value"
                    );
                    continue;
                }
            };
            match self.socket.send_to(&datagram, destination.address).await {
                Ok(_) => sent = sent.saturating_add(1),
                Err(e) => {
                    warn!(target = %destination.address, error = %e, "Input relay send failed");
                }
            }
        }
        debug!(encoder = %event.name, field = %field, value, sent, "Input relayed");

        Some(RelayedValue { field, value, sent })
    }

    /// Resolves `event` to the bound field and its new value.
    pub fn apply(&self, event: &EncoderEvent) -> Option<(String, f32)> {
        let binding = self.bindings.get(&event.name)?;
        #[allow(
            clippy::cast_precision_loss,
            reason = "encoder deltas and values are small integers"
        )]
        let raw = event.delta as f32;

        let value = match binding.mode {
            InputMode::Absolute => raw,
            InputMode::Relative => {
                let mut accumulators = self.accumulators.lock();
                let slot = accumulators.entry(event.name.clone()).or_insert(0.0);
                *slot = normalize_angle(*slot + raw);
                *slot
            }
        };
        Some((binding.field.clone(), value))
    }

    /// Current accumulated value of a relative encoder.
    pub fn accumulated(&self, encoder: &str) -> Option<f32> {
        self.accumulators.lock().get(encoder).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;
    use simpanel_dref::{Marker, Padding};
    use std::time::Duration;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn bindings() -> BTreeMap<String, InputBinding> {
        BTreeMap::from([
            (
                "HDG".to_string(),
                InputBinding {
                    field: "sim/cockpit/autopilot/heading_mag".to_string(),
                    mode: InputMode::Relative,
                },
            ),
            (
                "BARO".to_string(),
                InputBinding {
                    field: "sim/cockpit/misc/barometer_setting".to_string(),
                    mode: InputMode::Absolute,
                },
            ),
        ])
    }

    async fn relay_to(destinations: Vec<SimulatorDestination>) -> Result<InputRelay, std::io::Error> {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await?);
        Ok(InputRelay::new(
            bindings(),
            destinations,
            socket,
            Notifications::new(Arc::new(NullNotifier)),
        ))
    }

    fn event(name: &str, delta: i32) -> EncoderEvent {
        EncoderEvent {
            name: name.to_string(),
            delta,
            button: "released".to_string(),
        }
    }

    #[tokio::test]
    async fn test_relative_wraps_both_ways() -> TestResult {
        let relay = relay_to(Vec::new()).await?;

        let (_, value) = relay.apply(&event("HDG", -5)).ok_or("unbound")?;
        assert!((value - 355.0).abs() < 1e-4);
        let (_, value) = relay.apply(&event("HDG", 10)).ok_or("unbound")?;
        assert!((value - 5.0).abs() < 1e-4);
        assert!(relay.accumulated("HDG").is_some_and(|v| (v - 5.0).abs() < 1e-4));
        Ok(())
    }

    #[tokio::test]
    async fn test_absolute_passes_value() -> TestResult {
        let relay = relay_to(Vec::new()).await?;
        let (field, value) = relay.apply(&event("BARO", 2992)).ok_or("unbound")?;
        assert_eq!(field, "sim/cockpit/misc/barometer_setting");
        assert!((value - 2992.0).abs() < 1e-4);
        assert_eq!(relay.accumulated("BARO"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_unbound_encoder_not_relayed() -> TestResult {
        let relay = relay_to(Vec::new()).await?;
        assert_eq!(relay.relay(&event("NAV1", 1)).await, None);
        assert_eq!(relay.handle_datagram(b"HEARTBEAT:ESP_VSI").await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_datagram_reaches_every_destination() -> TestResult {
        let padded = UdpSocket::bind("127.0.0.1:0").await?;
        let terminated = UdpSocket::bind("127.0.0.1:0").await?;
        let relay = relay_to(vec![
            SimulatorDestination {
                address: padded.local_addr()?,
                marker: Marker::Outbound,
                padding: Padding::Fixed,
            },
            SimulatorDestination {
                address: terminated.local_addr()?,
                marker: Marker::Outbound,
                padding: Padding::Terminated,
            },
        ])
        .await?;

        let relayed = relay
            .handle_datagram(b"ENCODER:HDG:15:PRESSED\n")
            .await
            .ok_or("not relayed")?;
        assert_eq!(relayed.sent, 2);

        let mut buf = [0u8; 1024];
        for socket in [&padded, &terminated] {
            let (len, _) = tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await??;
            let message = simpanel_dref::decode_with(Marker::Outbound, buf.get(..len).ok_or("short")?)
                .ok_or("undecodable")?;
            assert_eq!(message.field, "sim/cockpit/autopilot/heading_mag");
            assert!((message.value - 15.0).abs() < 1e-4);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_encode_failure_skips_only_that_destination() -> TestResult {
        let padded = UdpSocket::bind("127.0.0.1:0").await?;
        let terminated = UdpSocket::bind("127.0.0.1:0").await?;
        let long_field = "sim/".repeat(150);
        let relay = InputRelay::new(
            BTreeMap::from([(
                "LONG".to_string(),
                InputBinding {
                    field: long_field.clone(),
                    mode: InputMode::Absolute,
                },
            )]),
            vec![
                SimulatorDestination {
                    address: padded.local_addr()?,
                    marker: Marker::Outbound,
                    padding: Padding::Fixed,
                },
                SimulatorDestination {
                    address: terminated.local_addr()?,
                    marker: Marker::Outbound,
                    padding: Padding::Terminated,
                },
            ],
            Arc::new(UdpSocket::bind("127.0.0.1:0").await?),
            Notifications::new(Arc::new(NullNotifier)),
        );

        let relayed = relay.relay(&event("LONG", 7)).await.ok_or("not relayed")?;
        assert_eq!(relayed.sent, 1);

        let mut buf = [0u8; 1024];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), terminated.recv_from(&mut buf)).await??;
        let message = simpanel_dref::decode_with(Marker::Outbound, buf.get(..len).ok_or("short")?)
            .ok_or("undecodable")?;
        assert_eq!(message.field, long_field);
        Ok(())
    }
}
