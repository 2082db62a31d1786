//! Simulator telemetry to motor commands.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use simpanel_aggregator::{MotorAggregator, MotorUpdate};
use simpanel_calibration::CalibrationStore;
use simpanel_mapping::SharedResolver;
use simpanel_protocol::DeviceCommand;
use tracing::{debug, info, trace};

use crate::dispatcher::{CommandDispatcher, SendOutcome};
use crate::notify::{Notifications, TelemetryNotice};
use crate::stats::TelemetryStats;

/// A motor update and what happened when it was sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedUpdate {
    pub update: MotorUpdate,
    pub outcome: SendOutcome,
}

#[derive(Debug)]
pub struct TelemetryRouter {
    resolver: Arc<SharedResolver>,
    calibrations: Arc<CalibrationStore>,
    aggregator: Mutex<MotorAggregator>,
    stats: Arc<TelemetryStats>,
    dispatcher: Arc<CommandDispatcher>,
    notifications: Notifications,
}

impl TelemetryRouter {
    pub fn new(
        resolver: Arc<SharedResolver>,
        calibrations: Arc<CalibrationStore>,
        aggregator: MotorAggregator,
        stats: Arc<TelemetryStats>,
        dispatcher: Arc<CommandDispatcher>,
        notifications: Notifications,
    ) -> Self {
        Self {
            resolver,
            calibrations,
            aggregator: Mutex::new(aggregator),
            stats,
            dispatcher,
            notifications,
        }
    }

    /// Decodes one simulator datagram and routes its value.
    pub async fn handle_datagram(&self, datagram: &[u8]) -> Vec<RoutedUpdate> {
        let Some(message) = simpanel_dref::decode(datagram) else {
            self.stats.record_undecodable();
            debug!(len = datagram.len(), "Undecodable telemetry datagram");
            return Vec::new();
        };
        self.route(&message.field, message.value).await
    }

    /// Feeds `value` to every motor mapped from `field` and dispatches the
    /// resulting angles.
    pub async fn route(&self, field: &str, value: f32) -> Vec<RoutedUpdate> {
        self.stats.record_field(field, value);
        let index = self.resolver.snapshot();
        let targets = index.resolve(field);

        let updates = {
            let mut aggregator = self.aggregator.lock();
            if aggregator.note_field(field) {
                if targets.is_empty() {
                    debug!(field, "First sighting of unmapped field");
                } else {
                    info!(field, motors = targets.len(), "First sighting of mapped field");
                }
            }

            let mut updates = Vec::new();
            for target in targets {
                if target.value_range.is_some_and(|range| !range.accepts(value)) {
                    trace!(field, key = %target.key, value, "Value outside device range");
                    continue;
                }
                let device_id = target.key.device_id.as_str();
                self.stats.record_device(device_id);
                updates.extend(aggregator.observe(target, field, value, |v| {
                    self.calibrations.angle_for(device_id, v)
                }));
            }
            updates
        };

        let mut routed = Vec::with_capacity(updates.len());
        for update in updates {
            let command = DeviceCommand::Value {
                motor: update.key.motor_id,
                angle: update.angle,
            };
            let outcome = self.dispatcher.send(&update.key.device_id, &command).await;
            self.notifications.telemetry(TelemetryNotice {
                field_name: field.to_string(),
                value: update.angle,
                esp_id: update.key.device_id.clone(),
                motor_id: update.key.motor_id,
            });
            routed.push(RoutedUpdate { update, outcome });
        }
        routed
    }

    /// Forgets every accumulated motor value.
    pub fn reset(&self) {
        self.aggregator.lock().clear();
    }

    pub fn last_dispatched(&self, key: &simpanel_mapping::MotorKey) -> Option<f32> {
        self.aggregator.lock().last_dispatched(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelNotifier, Notice};
    use crate::registry::DeviceRegistry;
    use simpanel_calibration::InMemoryRepository;
    use simpanel_dref::{DrefEncoder, Marker, Padding};
    use simpanel_mapping::{MappingIndex, MotorKey};
    use simpanel_protocol::Heartbeat;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc::UnboundedReceiver;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const MAPPING: &str = r#"{
        "instruments": {
            "Heading": {
                "device_id": "D1",
                "motors": { "0": { "dref": "nav/heading" } }
            },
            "VSI": {
                "device_id": "ESP_VSI",
                "value_range": { "min": -6000, "max": 6000 },
                "motors": { "0": { "dref": "sim/vvi", "calibrated": true } }
            }
        }
    }"#;

    struct Fixture {
        router: TelemetryRouter,
        device: UdpSocket,
        notices: UnboundedReceiver<Notice>,
    }

    async fn fixture() -> Result<Fixture, Box<dyn std::error::Error>> {
        let device = UdpSocket::bind("127.0.0.1:0").await?;
        let registry = Arc::new(DeviceRegistry::new(Duration::from_secs(30)));
        registry.record_heartbeat(&Heartbeat::new("D1", None), "127.0.0.1".parse()?);
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await?);
        let dispatcher = Arc::new(CommandDispatcher::new(
            socket,
            registry,
            device.local_addr()?.port(),
        ));
        let (notifier, notices) = ChannelNotifier::new();

        let router = TelemetryRouter::new(
            Arc::new(SharedResolver::new(MappingIndex::from_json(MAPPING)?)),
            Arc::new(CalibrationStore::load(Arc::new(InMemoryRepository::new()))),
            MotorAggregator::default(),
            Arc::new(TelemetryStats::new()),
            dispatcher,
            Notifications::new(Arc::new(notifier)),
        );
        Ok(Fixture {
            router,
            device,
            notices,
        })
    }

    fn inbound(field: &str, value: f32) -> Result<Vec<u8>, simpanel_dref::DrefError> {
        DrefEncoder::new(Marker::Inbound, Padding::Terminated).encode(field, value)
    }

    #[tokio::test]
    async fn test_heading_wraps_to_whole_degrees() -> TestResult {
        let mut fx = fixture().await?;

        let routed = fx.router.handle_datagram(&inbound("nav/heading", 359.6)?).await;
        assert_eq!(routed.len(), 1);
        assert_eq!(routed.first().map(|r| r.outcome), Some(SendOutcome::Sent));

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), fx.device.recv_from(&mut buf)).await??;
        assert_eq!(buf.get(..len), Some(&b"VALUE:0:359"[..]));

        let notice = tokio::time::timeout(Duration::from_secs(1), fx.notices.recv()).await?;
        assert!(matches!(
            notice,
            Some(Notice::Telemetry(n)) if n.esp_id == "D1" && n.field_name == "nav/heading"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_small_change_suppressed() -> TestResult {
        let fx = fixture().await?;
        assert_eq!(fx.router.route("nav/heading", 100.0).await.len(), 1);
        assert!(fx.router.route("nav/heading", 100.5).await.is_empty());
        assert_eq!(fx.router.route("nav/heading", 101.5).await.len(), 1);

        let key = MotorKey::new("D1", 0);
        assert!(fx.router.last_dispatched(&key).is_some_and(|a| (a - 101.5).abs() < 1e-4));
        fx.router.reset();
        assert_eq!(fx.router.last_dispatched(&key), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_device_reports_unknown() -> TestResult {
        let fx = fixture().await?;
        let routed = fx.router.route("sim/vvi", 500.0).await;
        assert_eq!(routed.first().map(|r| r.outcome), Some(SendOutcome::DeviceUnknown));
        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_range_value_ignored() -> TestResult {
        let fx = fixture().await?;
        assert!(fx.router.route("sim/vvi", 9000.0).await.is_empty());
        assert_eq!(fx.router.stats.device_messages("ESP_VSI"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_garbage_counted() -> TestResult {
        let fx = fixture().await?;
        assert!(fx.router.handle_datagram(b"DREF+\x00").await.is_empty());
        assert!(fx.router.route("sim/unmapped", 1.0).await.is_empty());
        assert_eq!(fx.router.stats.undecodable(), 1);
        assert_eq!(fx.router.stats.total_datagrams(), 1);
        Ok(())
    }
}
