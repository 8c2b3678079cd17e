//! BLE Connection Module
//!
//! Link-level connect followed by mandatory service and characteristic
//! discovery. Any step failing surfaces as a single terminal
//! `ConnectionFailed`; no partially connected state leaks to the caller.

use crate::domain::models::{AppEvent, ControlError, DeviceRecord, MessageSeverity, StatusMessage};
use crate::infrastructure::bluetooth::link::{CentralLink, CentralRadio, LinkEvent};
use crate::infrastructure::bluetooth::protocol;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Service UUID to look for
    pub service_uuid: String,
    /// Control characteristic UUID
    pub control_char_uuid: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            service_uuid: protocol::SERVICE_UUID.to_string(),
            control_char_uuid: protocol::CONTROL_CHAR_UUID.to_string(),
        }
    }
}

pub struct BleConnection {
    radio: Arc<dyn CentralRadio>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: ConnectionConfig,
}

impl BleConnection {
    pub fn new(
        radio: Arc<dyn CentralRadio>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            radio,
            event_sender,
            config,
        }
    }

    /// Establish the link. Discovery is a separate step so the caller can
    /// track the lifecycle state between the two.
    pub async fn connect_link(
        &self,
        device: &DeviceRecord,
    ) -> Result<(Box<dyn CentralLink>, mpsc::UnboundedReceiver<LinkEvent>), ControlError> {
        info!(name = %device.name, id = %device.id, "Connecting to peripheral");
        self.send_log("Connecting to skateboard...", MessageSeverity::Info);

        self.radio.connect(&device.id).await.map_err(|e| {
            warn!(error = %e, "Link-level connect failed");
            ControlError::ConnectionFailed(format!("connect: {e}"))
        })
    }

    /// Locate the control service and characteristic. On failure the link
    /// is closed before the error is returned.
    pub async fn discover(&self, link: &mut dyn CentralLink) -> Result<(), ControlError> {
        info!(
            service = %self.config.service_uuid,
            characteristic = %self.config.control_char_uuid,
            "Discovering control service"
        );

        match link
            .discover(&self.config.service_uuid, &self.config.control_char_uuid)
            .await
        {
            Ok(()) => {
                info!("Control characteristic found");
                self.send_log("Connection established!", MessageSeverity::Success);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Service discovery failed");
                link.close().await;
                self.send_log("Connection failed.", MessageSeverity::Error);
                Err(ControlError::ConnectionFailed(format!("discovery: {e}")))
            }
        }
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}
