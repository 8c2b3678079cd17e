//! Control Service Module
//!
//! Client-side coordinator: owns the connection state machine and exposes
//! the surface the remote screen drives (scan, connect, accelerate,
//! decelerate, double-press stop, reverse, telemetry).
//!
//! A failed write on an established link is treated as an implicit
//! disconnect; the service surfaces `Disconnected` once and leaves the
//! retry decision to the caller, which re-enters discovery by scanning
//! again.

use crate::domain::gestures::DoublePressDetector;
use crate::domain::models::{
    AppEvent, Command, ConnectionState, ControlError, DeviceRecord, MessageSeverity, StatusMessage,
    TelemetrySnapshot,
};
use crate::domain::ramp::RampEngine;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{
    connection::{BleConnection, ConnectionConfig},
    link::{CentralLink, CentralRadio, LinkEvent},
    protocol,
    scanner::BleScanner,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Client-side parameters, normally taken from settings at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Advertised name to match during discovery
    pub device_name: String,
    pub scan_timeout: Duration,
    pub stop_press_window: Duration,
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_name: protocol::LOCAL_NAME.to_string(),
            scan_timeout: Duration::from_secs(10),
            stop_press_window: Duration::from_millis(2000),
            connection: ConnectionConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            device_name: settings.device_name.clone(),
            scan_timeout: settings.scan_timeout(),
            stop_press_window: settings.stop_press_window(),
            connection: ConnectionConfig {
                service_uuid: settings.ble_service_uuid.clone(),
                control_char_uuid: settings.ble_control_char_uuid.clone(),
            },
        }
    }
}

/// Main control service coordinating all client-side BLE operations
pub struct ControlService {
    scanner: BleScanner,
    connection: BleConnection,
    link: Option<Box<dyn CentralLink>>,
    link_events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    state: ConnectionState,
    ramp: RampEngine,
    stop_detector: DoublePressDetector,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: ClientConfig,
}

impl ControlService {
    pub fn new(
        radio: Arc<dyn CentralRadio>,
        config: ClientConfig,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            scanner: BleScanner::new(radio.clone(), event_sender.clone()),
            connection: BleConnection::new(radio, event_sender.clone(), config.connection.clone()),
            link: None,
            link_events: None,
            state: ConnectionState::Idle,
            ramp: RampEngine::new(),
            stop_detector: DoublePressDetector::new(config.stop_press_window),
            event_sender,
            config,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Commanded drive state, for rendering the indicator.
    pub fn ramp(&self) -> &RampEngine {
        &self.ramp
    }

    fn set_state(&mut self, state: ConnectionState) {
        if state != self.state {
            debug!(from = ?self.state, to = ?state, "Connection state changed");
            self.state = state.clone();
            let _ = self.event_sender.send(AppEvent::ConnectionState(state));
        }
    }

    /// Absorb unsolicited link events before acting on the link. An
    /// unexpected disconnect observed here drops the link without retrying.
    fn drain_link_events(&mut self) {
        let mut dropped = None;
        if let Some(events) = self.link_events.as_mut() {
            while let Ok(event) = events.try_recv() {
                match event {
                    LinkEvent::Disconnected { reason } => dropped = Some(reason),
                }
            }
        }
        if let Some(reason) = dropped {
            warn!(%reason, "Peripheral disconnected");
            self.link = None;
            self.link_events = None;
            self.set_state(ConnectionState::Disconnected(reason));
        }
    }

    /// Run one scan session for the configured device name. A session
    /// already in progress makes this a guarded no-op.
    pub async fn scan(&mut self) -> Result<DeviceRecord, ControlError> {
        if self.state == ConnectionState::Scanning {
            debug!("Scan request ignored, session already running");
            return Err(ControlError::ScanInProgress);
        }

        let target_name = self.config.device_name.clone();
        let timeout = self.config.scan_timeout;

        self.set_state(ConnectionState::Scanning);
        match self.scanner.scan(&target_name, timeout).await {
            Ok(device) => {
                self.set_state(ConnectionState::Idle);
                Ok(device)
            }
            Err(e) => {
                self.set_state(ConnectionState::Idle);
                Err(e)
            }
        }
    }

    /// Connect and discover. Declares `Ready` only once the control
    /// characteristic has been located; a fresh session always starts from
    /// the stationary drive state.
    pub async fn connect(&mut self, device: &DeviceRecord) -> Result<(), ControlError> {
        if let Some(mut link) = self.link.take() {
            info!("Dropping previous connection before reconnecting");
            link.close().await;
            self.link_events = None;
        }

        self.set_state(ConnectionState::Connecting);
        let (mut link, events) = match self.connection.connect_link(device).await {
            Ok(ok) => ok,
            Err(e) => {
                self.set_state(ConnectionState::Failed(e.to_string()));
                return Err(e);
            }
        };

        self.set_state(ConnectionState::Discovering);
        if let Err(e) = self.connection.discover(link.as_mut()).await {
            self.set_state(ConnectionState::Failed(e.to_string()));
            return Err(e);
        }

        // Notification interest is best effort; reads still work without it.
        if let Err(e) = link.subscribe().await {
            warn!(error = %e, "Could not subscribe to notifications, continuing");
        }

        self.link = Some(link);
        self.link_events = Some(events);
        self.ramp.reset();
        self.stop_detector.reset();
        self.set_state(ConnectionState::Ready);
        Ok(())
    }

    /// Acknowledged command write. Only valid in `Ready`; generates no wire
    /// traffic otherwise.
    pub async fn send_command(&mut self, command: Command) -> Result<(), ControlError> {
        self.drain_link_events();
        if self.state != ConnectionState::Ready {
            return Err(ControlError::NotConnected);
        }
        let link = self.link.as_mut().ok_or(ControlError::NotConnected)?;

        match link.write(protocol::encode(&command)).await {
            Ok(()) => {
                debug!(?command, "Command written");
                Ok(())
            }
            Err(e) => {
                warn!(?command, error = %e, "Characteristic write failed, dropping connection");
                self.link = None;
                self.link_events = None;
                self.set_state(ConnectionState::Disconnected(format!("write failed: {e}")));
                Err(ControlError::LinkError(e.to_string()))
            }
        }
    }

    /// Read and decode the board's telemetry payload.
    pub async fn read_telemetry(&mut self) -> Result<TelemetrySnapshot, ControlError> {
        self.drain_link_events();
        if self.state != ConnectionState::Ready {
            return Err(ControlError::NotConnected);
        }
        let link = self.link.as_mut().ok_or(ControlError::NotConnected)?;

        let payload = match link.read().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Characteristic read failed, dropping connection");
                self.link = None;
                self.link_events = None;
                self.set_state(ConnectionState::Disconnected(format!("read failed: {e}")));
                return Err(ControlError::LinkError(e.to_string()));
            }
        };

        let snapshot = protocol::decode_telemetry(&payload)
            .map_err(|e| ControlError::LinkError(format!("telemetry: {e}")))?;
        let _ = self.event_sender.send(AppEvent::Telemetry(snapshot));
        Ok(snapshot)
    }

    /// One accelerate tap: advance the ramp and transmit the emitted command.
    pub async fn accelerate(&mut self) -> Result<(), ControlError> {
        self.drain_link_events();
        if self.state != ConnectionState::Ready {
            return Err(ControlError::NotConnected);
        }
        let command = self.ramp.accelerate();
        self.send_command(command).await
    }

    /// One decelerate tap, mirror of [`accelerate`](Self::accelerate).
    pub async fn decelerate(&mut self) -> Result<(), ControlError> {
        self.drain_link_events();
        if self.state != ConnectionState::Ready {
            return Err(ControlError::NotConnected);
        }
        let command = self.ramp.decelerate();
        self.send_command(command).await
    }

    /// One stop tap. Returns true when the tap confirmed the double-press
    /// gesture and the stop command went out.
    pub async fn stop_tap(&mut self, now: Instant) -> Result<bool, ControlError> {
        self.drain_link_events();
        if self.state != ConnectionState::Ready {
            return Err(ControlError::NotConnected);
        }
        if !self.stop_detector.press(now) {
            debug!("Stop armed, waiting for confirming tap");
            return Ok(false);
        }
        info!("Double press confirmed, stopping");
        let command = self.ramp.stop();
        self.send_command(command).await?;
        Ok(true)
    }

    pub async fn set_reverse(&mut self, reverse: bool) -> Result<(), ControlError> {
        self.send_command(Command::ReverseSet(reverse)).await
    }

    /// Deliberate disconnect requested by the caller.
    pub async fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
            info!("Disconnected from skateboard");
            let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
                message: "Disconnected from skateboard".to_string(),
                severity: MessageSeverity::Info,
            }));
        }
        self.link_events = None;
        self.ramp.reset();
        self.stop_detector.reset();
        self.set_state(ConnectionState::Idle);
    }
}
