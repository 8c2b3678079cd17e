//! Peripheral GATT Service
//!
//! The board-side service: advertises the control service under a fixed
//! local name, owns the authoritative motion state, decodes inbound writes
//! and relays validated commands to the actuation bridge. Undecodable
//! writes are still acknowledged at the link level; the wireless protocol
//! has no negative-acknowledgement channel, so those failures are only
//! visible in the local logs.

use crate::domain::models::{Command, TelemetrySnapshot};
use crate::domain::ramp::RampEngine;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::link::{
    AdapterState, AdvertisingOptions, CharacteristicDefinition, PeripheralEvent, PeripheralRadio,
    ReadOutcome, ServiceDefinition, WriteOutcome,
};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bridge::BridgeHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Interval between advertising status log lines.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GattServerConfig {
    pub local_name: String,
    pub service_uuid: String,
    pub control_char_uuid: String,
}

impl Default for GattServerConfig {
    fn default() -> Self {
        Self {
            local_name: protocol::LOCAL_NAME.to_string(),
            service_uuid: protocol::SERVICE_UUID.to_string(),
            control_char_uuid: protocol::CONTROL_CHAR_UUID.to_string(),
        }
    }
}

impl GattServerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            local_name: settings.device_name.clone(),
            service_uuid: settings.ble_service_uuid.clone(),
            control_char_uuid: settings.ble_control_char_uuid.clone(),
        }
    }
}

pub struct GattServer {
    radio: Arc<dyn PeripheralRadio>,
    bridge: BridgeHandle,
    config: GattServerConfig,
    motion: RampEngine,
    reverse: bool,
    advertising: bool,
    connected: bool,
    subscribed: bool,
}

impl GattServer {
    pub fn new(
        radio: Arc<dyn PeripheralRadio>,
        bridge: BridgeHandle,
        config: GattServerConfig,
    ) -> Self {
        Self {
            radio,
            bridge,
            config,
            motion: RampEngine::new(),
            reverse: false,
            advertising: false,
            connected: false,
            subscribed: false,
        }
    }

    /// Run the peripheral event loop until the radio closes its event
    /// stream. Each event executes to completion before the next one, so
    /// motion state mutation is serialized without locking.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<PeripheralEvent>) {
        info!(name = %self.config.local_name, "BLE server starting");
        let mut status = tokio::time::interval(STATUS_LOG_INTERVAL);
        status.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("Radio event stream closed, shutting down BLE server");
                        break;
                    }
                },
                _ = status.tick() => self.log_status(),
            }
        }

        if self.advertising {
            self.radio.stop_advertising().await;
            info!("Stopped advertising");
        }
    }

    async fn handle_event(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::StateChange(state) => self.on_state_change(state).await,
            PeripheralEvent::AdvertisingStarted => self.on_advertising_started().await,
            PeripheralEvent::Connected { address } => {
                info!(%address, "Connection accepted");
                self.connected = true;
            }
            PeripheralEvent::Disconnected { address } => {
                info!(%address, "Client disconnected, resetting motion state");
                self.connected = false;
                self.subscribed = false;
                self.motion.reset();
                self.reverse = false;
            }
            PeripheralEvent::ReadRequest { respond } => {
                let _ = respond.send(self.on_read());
            }
            PeripheralEvent::WriteRequest { value, respond } => {
                let _ = respond.send(self.on_write(&value));
            }
            PeripheralEvent::Subscribed => {
                info!("Client subscribed to notifications");
                self.subscribed = true;
            }
            PeripheralEvent::Unsubscribed => {
                info!("Client unsubscribed from notifications");
                self.subscribed = false;
            }
        }
    }

    async fn on_state_change(&mut self, state: AdapterState) {
        info!(?state, advertising = self.advertising, "Bluetooth state changed");
        match state {
            AdapterState::PoweredOn if !self.advertising => {
                let options = AdvertisingOptions {
                    local_name: self.config.local_name.clone(),
                    service_uuids: vec![self.config.service_uuid.clone()],
                    manufacturer_data: protocol::MANUFACTURER_DATA.to_vec(),
                    tx_power_level: protocol::TX_POWER_LEVEL,
                    connectable: true,
                };
                match self.radio.start_advertising(&options).await {
                    Ok(()) => {
                        self.advertising = true;
                        info!(
                            name = %self.config.local_name,
                            service = %self.config.service_uuid,
                            "Started advertising"
                        );
                    }
                    Err(e) => error!(error = %e, "Failed to start advertising"),
                }
            }
            AdapterState::PoweredOn => {}
            AdapterState::PoweredOff => {
                if self.advertising {
                    self.radio.stop_advertising().await;
                    self.advertising = false;
                    info!("Stopped advertising");
                }
            }
        }
    }

    async fn on_advertising_started(&mut self) {
        let service = ServiceDefinition {
            uuid: self.config.service_uuid.clone(),
            characteristics: vec![CharacteristicDefinition {
                uuid: self.config.control_char_uuid.clone(),
                read: true,
                write: true,
                notify: true,
                description: Some(protocol::CONTROL_CHAR_DESCRIPTION.to_string()),
            }],
        };
        match self.radio.set_services(vec![service]).await {
            Ok(()) => info!(
                service = %self.config.service_uuid,
                characteristic = %self.config.control_char_uuid,
                "Services set successfully"
            ),
            Err(e) => error!(error = %e, "Error setting services"),
        }
    }

    fn on_read(&self) -> ReadOutcome {
        let snapshot = TelemetrySnapshot {
            speed: self.motion.speed(),
            reverse: self.reverse,
        };
        match protocol::encode_telemetry(&snapshot) {
            Ok(payload) => {
                debug!(speed = snapshot.speed, reverse = snapshot.reverse, "Read request handled");
                ReadOutcome::Success(payload)
            }
            Err(e) => {
                // Generic failure on the link; detail stays local.
                error!(error = %e, "Read request failed");
                ReadOutcome::Failure
            }
        }
    }

    fn on_write(&mut self, value: &[u8]) -> WriteOutcome {
        match protocol::decode(value) {
            Ok(command) => {
                debug!(?command, "Write request received");
                match command {
                    Command::Accelerate => {
                        self.motion.accelerate();
                    }
                    Command::Decelerate => {
                        self.motion.decelerate();
                    }
                    Command::Stop => {
                        self.motion.stop();
                    }
                    Command::ReverseSet(reverse) => {
                        self.reverse = reverse;
                    }
                }
                self.bridge.send(command);
                WriteOutcome::Success
            }
            Err(e) => {
                // No state action; the write is still acked on the link.
                warn!(error = %e, "Ignoring undecodable write");
                WriteOutcome::Success
            }
        }
    }

    fn log_status(&self) {
        if self.advertising {
            info!(
                advertising = self.advertising,
                connected = self.connected,
                speed = self.motion.speed(),
                reverse = self.reverse,
                subscribed = self.subscribed,
                bridge_connected = self.bridge.is_connected(),
                service = %self.config.service_uuid,
                characteristic = %self.config.control_char_uuid,
                "Server status"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::link::{CentralLink, CentralRadio};
    use crate::infrastructure::bluetooth::loopback::LoopbackRadio;
    use crate::infrastructure::bridge;

    async fn connected_link(radio: &LoopbackRadio) -> Box<dyn CentralLink> {
        let central: &dyn CentralRadio = radio;
        let mut advertisements = central.start_scan().await.unwrap();
        let advertisement =
            tokio::time::timeout(Duration::from_secs(1), advertisements.recv())
                .await
                .expect("advertisement deadline")
                .expect("advertisement");
        central.stop_scan().await;
        let (mut link, _events) = central.connect(&advertisement.id).await.unwrap();
        link.discover(protocol::SERVICE_UUID, protocol::CONTROL_CHAR_UUID)
            .await
            .unwrap();
        link
    }

    fn spawn_server(radio: &LoopbackRadio, events: mpsc::UnboundedReceiver<PeripheralEvent>) {
        let bridge = bridge::spawn("127.0.0.1:1".to_string(), Duration::from_secs(60));
        let server = GattServer::new(
            Arc::new(radio.clone()),
            bridge,
            GattServerConfig::default(),
        );
        tokio::spawn(server.run(events));
    }

    async fn read_snapshot(link: &mut Box<dyn CentralLink>) -> TelemetrySnapshot {
        protocol::decode_telemetry(&link.read().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn writes_advance_motion_and_reads_report_it() {
        let (radio, events) = LoopbackRadio::new();
        spawn_server(&radio, events);
        radio.set_powered(true);

        let mut link = connected_link(&radio).await;
        assert_eq!(
            read_snapshot(&mut link).await,
            TelemetrySnapshot {
                speed: 0,
                reverse: false
            }
        );

        for _ in 0..3 {
            link.write(b"accelerate").await.unwrap();
        }
        link.write(b"reverse_on").await.unwrap();

        let snapshot = read_snapshot(&mut link).await;
        assert_eq!(snapshot.speed, 9);
        assert!(snapshot.reverse);

        link.write(b"stop").await.unwrap();
        assert_eq!(read_snapshot(&mut link).await.speed, 0);
    }

    #[tokio::test]
    async fn unknown_commands_are_acked_and_ignored() {
        let (radio, events) = LoopbackRadio::new();
        spawn_server(&radio, events);
        radio.set_powered(true);

        let mut link = connected_link(&radio).await;
        link.write(b"accelerate").await.unwrap();

        // Acked at the link level, no state action.
        link.write(b"warp_speed").await.unwrap();
        link.write(&[0xff, 0xfe]).await.unwrap();

        assert_eq!(read_snapshot(&mut link).await.speed, 5);
    }

    #[tokio::test]
    async fn disconnect_resets_motion_state() {
        let (radio, events) = LoopbackRadio::new();
        spawn_server(&radio, events);
        radio.set_powered(true);

        let mut link = connected_link(&radio).await;
        for _ in 0..4 {
            link.write(b"accelerate").await.unwrap();
        }
        link.write(b"reverse_on").await.unwrap();
        link.close().await;

        // A fresh connection starts from stationary with reverse cleared.
        let mut link = connected_link(&radio).await;
        assert_eq!(
            read_snapshot(&mut link).await,
            TelemetrySnapshot {
                speed: 0,
                reverse: false
            }
        );
    }

    #[tokio::test]
    async fn saturated_ramp_clamps_at_max_duty() {
        let (radio, events) = LoopbackRadio::new();
        spawn_server(&radio, events);
        radio.set_powered(true);

        let mut link = connected_link(&radio).await;
        for _ in 0..30 {
            link.write(b"accelerate").await.unwrap();
        }
        assert_eq!(read_snapshot(&mut link).await.speed, 60);
    }
}
