//! BLE Scanner Module
//!
//! Name-filtered device discovery. A scan session runs until the advertised
//! name matches exactly or the timeout elapses; the first exact match
//! short-circuits the session.

use crate::domain::models::{AppEvent, ControlError, DeviceRecord, MessageSeverity, StatusMessage};
use crate::infrastructure::bluetooth::link::CentralRadio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, trace};

pub struct BleScanner {
    radio: Arc<dyn CentralRadio>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl BleScanner {
    pub fn new(radio: Arc<dyn CentralRadio>, event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { radio, event_sender }
    }

    /// Run one scan session. Previous session results are implicitly
    /// discarded; only the matching device is reported.
    pub async fn scan(
        &mut self,
        target_name: &str,
        timeout: Duration,
    ) -> Result<DeviceRecord, ControlError> {
        info!(name = target_name, ?timeout, "Starting BLE scan");
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: format!("Scanning for {target_name}..."),
            severity: MessageSeverity::Info,
        }));

        let mut advertisements = self
            .radio
            .start_scan()
            .await
            .map_err(|e| ControlError::ConnectionFailed(format!("scan start: {e}")))?;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let found = loop {
            tokio::select! {
                _ = &mut deadline => break None,
                advertisement = advertisements.recv() => match advertisement {
                    Some(adv) if adv.name == target_name => break Some(adv),
                    Some(adv) => trace!(name = %adv.name, "Ignoring advertisement"),
                    // Radio stopped delivering; let the deadline decide.
                    None => break None,
                },
            }
        };

        self.radio.stop_scan().await;

        match found {
            Some(adv) => {
                info!(name = %adv.name, id = %adv.id, rssi = adv.rssi, "Peripheral found");
                let device = DeviceRecord {
                    name: adv.name,
                    id: adv.id,
                    rssi: adv.rssi,
                };
                let _ = self.event_sender.send(AppEvent::DeviceFound(device.clone()));
                Ok(device)
            }
            None => {
                info!(name = target_name, "Scan timed out without a match");
                let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
                    message: "No skateboard found.".to_string(),
                    severity: MessageSeverity::Warning,
                }));
                Err(ControlError::ScanTimeout)
            }
        }
    }
}
