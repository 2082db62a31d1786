//! Best-effort notifications to the operator dashboard.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use simpanel_protocol::EncoderEvent;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::DashboardConfig;
use crate::error::HubResult;

/// A motor update, in the dashboard's field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryNotice {
    pub field_name: String,
    pub value: f32,
    pub esp_id: String,
    pub motor_id: u8,
}

/// A raw input event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderNotice {
    pub encoder: String,
    pub value: i32,
    pub button: String,
}

impl From<&EncoderEvent> for EncoderNotice {
    fn from(event: &EncoderEvent) -> Self {
        Self {
            encoder: event.name.clone(),
            value: event.delta,
            button: event.button.clone(),
        }
    }
}

#[async_trait]
pub trait DashboardNotifier: Send + Sync {
    async fn telemetry(&self, notice: TelemetryNotice) -> HubResult<()>;

    async fn encoder(&self, notice: EncoderNotice) -> HubResult<()>;
}

/// Posts JSON to the dashboard's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotifier {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(config: &DashboardConfig) -> HubResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> HubResult<()> {
        self.client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl DashboardNotifier for HttpNotifier {
    async fn telemetry(&self, notice: TelemetryNotice) -> HubResult<()> {
        self.post("/api/xplane", &notice).await
    }

    async fn encoder(&self, notice: EncoderNotice) -> HubResult<()> {
        self.post("/api/encoder_event", &notice).await
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl DashboardNotifier for NullNotifier {
    async fn telemetry(&self, _notice: TelemetryNotice) -> HubResult<()> {
        Ok(())
    }

    async fn encoder(&self, _notice: EncoderNotice) -> HubResult<()> {
        Ok(())
    }
}

/// Notification delivered to an in-process consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Telemetry(TelemetryNotice),
    Encoder(EncoderNotice),
}

/// Forwards notifications over a channel, for embedding the hub in-process.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DashboardNotifier for ChannelNotifier {
    async fn telemetry(&self, notice: TelemetryNotice) -> HubResult<()> {
        if self.tx.send(Notice::Telemetry(notice)).is_err() {
            debug!("Notice receiver dropped");
        }
        Ok(())
    }

    async fn encoder(&self, notice: EncoderNotice) -> HubResult<()> {
        if self.tx.send(Notice::Encoder(notice)).is_err() {
            debug!("Notice receiver dropped");
        }
        Ok(())
    }
}

/// Builds the notifier selected by `config`.
///
/// # Errors
///
/// Fails if the HTTP client cannot be built.
pub fn notifier_for(config: &DashboardConfig) -> HubResult<Arc<dyn DashboardNotifier>> {
    if config.enabled {
        Ok(Arc::new(HttpNotifier::new(config)?))
    } else {
        Ok(Arc::new(NullNotifier))
    }
}

/// Fires notifications on detached tasks so the caller never waits on the
/// dashboard.
#[derive(Clone)]
pub struct Notifications {
    notifier: Arc<dyn DashboardNotifier>,
}

impl std::fmt::Debug for Notifications {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications").finish_non_exhaustive()
    }
}

impl Notifications {
    pub fn new(notifier: Arc<dyn DashboardNotifier>) -> Self {
        Self { notifier }
    }

    pub fn telemetry(&self, notice: TelemetryNotice) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.telemetry(notice).await {
                debug!(error = %e, "Dashboard telemetry notification failed");
            }
        });
    }

    pub fn encoder(&self, notice: EncoderNotice) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.encoder(notice).await {
                debug!(error = %e, "Dashboard encoder notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_notice_field_names() -> TestResult {
        let notice = TelemetryNotice {
            field_name: "sim/heading".to_string(),
            value: 90.0,
            esp_id: "ESP_Gyrocompass".to_string(),
            motor_id: 1,
        };
        let json = serde_json::to_value(&notice)?;
        assert_eq!(json["esp_id"], "ESP_Gyrocompass");
        assert_eq!(json["motor_id"], 1);

        let event = EncoderEvent::parse("ENCODER:HDG:-2:released")?;
        let json = serde_json::to_value(EncoderNotice::from(&event))?;
        assert_eq!(json, serde_json::json!({"encoder": "HDG", "value": -2, "button": "released"}));
        Ok(())
    }

    #[tokio::test]
    async fn test_channel_notifier_via_spawned_task() -> TestResult {
        let (notifier, mut rx) = ChannelNotifier::new();
        let notifications = Notifications::new(Arc::new(notifier));
        notifications.encoder(EncoderNotice {
            encoder: "BARO".to_string(),
            value: 1,
            button: "PRESSED".to_string(),
        });

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv()).await?;
        assert!(matches!(received, Some(Notice::Encoder(n)) if n.encoder == "BARO"));
        Ok(())
    }

    #[tokio::test]
    async fn test_http_notifier_posts_json() -> TestResult {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.map_err(|e| e.to_string())?;
            let mut request = Vec::new();
            let mut buf = [0u8; 2048];
            loop {
                let n = stream.read(&mut buf).await.map_err(|e| e.to_string())?;
                if n == 0 {
                    break;
                }
                request.extend_from_slice(buf.get(..n).unwrap_or_default());
                let text = String::from_utf8_lossy(&request);
                if text.contains("\r\n\r\n") && text.trim_end().ends_with('}') {
                    break;
                }
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .map_err(|e| e.to_string())?;
            Ok::<String, String>(String::from_utf8_lossy(&request).into_owned())
        });

        let notifier = HttpNotifier::new(&DashboardConfig {
            enabled: true,
            base_url: format!("http://{addr}/"),
            timeout_ms: 2000,
        })?;
        notifier
            .telemetry(TelemetryNotice {
                field_name: "nav/heading".to_string(),
                value: 359.0,
                esp_id: "D1".to_string(),
                motor_id: 0,
            })
            .await?;

        let request = server.await??;
        assert!(request.starts_with("POST /api/xplane HTTP/1.1"));
        assert!(request.contains(r#""esp_id":"D1""#));
        Ok(())
    }

    #[tokio::test]
    async fn test_http_notifier_unreachable_is_error() -> TestResult {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let notifier = HttpNotifier::new(&DashboardConfig {
            enabled: true,
            base_url: format!("http://{addr}"),
            timeout_ms: 500,
        })?;
        let result = notifier
            .encoder(EncoderNotice {
                encoder: "HDG".to_string(),
                value: 1,
                button: "released".to_string(),
            })
            .await;
        assert!(result.is_err());
        Ok(())
    }
}
