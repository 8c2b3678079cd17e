//! Radio Capability Traits
//!
//! The state machines on both sides of the link are written against these
//! traits rather than a platform BLE stack, so they can be driven by the
//! in-process [`loopback`](super::loopback) radio in tests and by platform
//! backends (BlueZ, WinRT, CoreBluetooth) in deployments.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors reported by a radio backend.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("adapter is powered off")]
    PoweredOff,
    #[error("peripheral not found")]
    PeripheralNotFound,
    #[error("peripheral is not connectable")]
    NotConnectable,
    #[error("service {0} not found")]
    ServiceNotFound(String),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(String),
    #[error("link closed: {0}")]
    LinkClosed(String),
    #[error("write rejected by peripheral")]
    WriteRejected,
    #[error("read rejected by peripheral")]
    ReadRejected,
}

/// An advertisement observed during a scan session.
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub name: String,
    pub id: String,
    pub rssi: i16,
}

/// Parameters for one advertising session.
#[derive(Debug, Clone)]
pub struct AdvertisingOptions {
    pub local_name: String,
    pub service_uuids: Vec<String>,
    pub manufacturer_data: Vec<u8>,
    pub tx_power_level: i8,
    pub connectable: bool,
}

/// A GATT service registered with the radio once advertising has started.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub uuid: String,
    pub characteristics: Vec<CharacteristicDefinition>,
}

#[derive(Debug, Clone)]
pub struct CharacteristicDefinition {
    pub uuid: String,
    pub read: bool,
    pub write: bool,
    pub notify: bool,
    pub description: Option<String>,
}

/// Unsolicited events delivered to a central about an established link.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Disconnected { reason: String },
}

/// Adapter power state as reported to the peripheral role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    PoweredOn,
    PoweredOff,
}

/// Response to a read request. Internal failures are collapsed to a generic
/// failure result; the link never carries error detail.
#[derive(Debug)]
pub enum ReadOutcome {
    Success(Vec<u8>),
    Failure,
}

/// Response to a write request.
#[derive(Debug)]
pub enum WriteOutcome {
    Success,
    Failure,
}

/// Events delivered from the radio to the peripheral service. Each
/// read/write request carries a responder the service must complete.
pub enum PeripheralEvent {
    StateChange(AdapterState),
    AdvertisingStarted,
    Connected {
        address: String,
    },
    Disconnected {
        address: String,
    },
    ReadRequest {
        respond: oneshot::Sender<ReadOutcome>,
    },
    WriteRequest {
        value: Vec<u8>,
        respond: oneshot::Sender<WriteOutcome>,
    },
    Subscribed,
    Unsubscribed,
}

/// Client-role radio: scan sessions and connection establishment.
#[async_trait]
pub trait CentralRadio: Send + Sync {
    /// Begin delivering advertisements on the returned stream until
    /// [`stop_scan`](Self::stop_scan) is called.
    async fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<Advertisement>, RadioError>;

    async fn stop_scan(&self);

    /// Establish a link to a previously discovered peripheral. The returned
    /// event stream carries unsolicited disconnects for this link.
    async fn connect(
        &self,
        device_id: &str,
    ) -> Result<(Box<dyn CentralLink>, mpsc::UnboundedReceiver<LinkEvent>), RadioError>;
}

/// One established client-side link.
#[async_trait]
pub trait CentralLink: Send {
    /// Locate the control service and characteristic. Must succeed before
    /// any write or read.
    async fn discover(
        &mut self,
        service_uuid: &str,
        characteristic_uuid: &str,
    ) -> Result<(), RadioError>;

    /// Acknowledged write to the control characteristic.
    async fn write(&mut self, payload: &[u8]) -> Result<(), RadioError>;

    /// Read the control characteristic.
    async fn read(&mut self) -> Result<Vec<u8>, RadioError>;

    /// Register notification interest with the peripheral. The current
    /// peripheral tracks interest but pushes no telemetry.
    async fn subscribe(&mut self) -> Result<(), RadioError>;

    async fn close(&mut self);
}

/// Peripheral-role radio: advertising and service registration. Inbound
/// traffic arrives on the [`PeripheralEvent`] stream handed out alongside
/// the radio.
#[async_trait]
pub trait PeripheralRadio: Send + Sync {
    async fn start_advertising(&self, options: &AdvertisingOptions) -> Result<(), RadioError>;

    async fn stop_advertising(&self);

    async fn set_services(&self, services: Vec<ServiceDefinition>) -> Result<(), RadioError>;
}
