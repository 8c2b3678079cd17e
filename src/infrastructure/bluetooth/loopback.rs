//! In-Process Loopback Radio
//!
//! One shared medium implementing both capability traits. The test suite
//! and the demo binary run the client and the peripheral against the same
//! `LoopbackRadio`, which delivers advertisements, connection events and
//! read/write requests over channels with no radio hardware involved.

use crate::infrastructure::bluetooth::link::{
    AdapterState, Advertisement, AdvertisingOptions, CentralLink, CentralRadio, LinkEvent,
    PeripheralEvent, PeripheralRadio, RadioError, ReadOutcome, ServiceDefinition, WriteOutcome,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Device id handed out in loopback advertisements.
pub const LOOPBACK_DEVICE_ID: &str = "loopback:0";

const LOOPBACK_RSSI: i16 = -42;
const CENTRAL_ADDRESS: &str = "loopback-central";

struct Shared {
    powered: bool,
    advertising: Option<AdvertisingOptions>,
    services: Vec<ServiceDefinition>,
    peripheral: Option<mpsc::UnboundedSender<PeripheralEvent>>,
    scanners: Vec<mpsc::UnboundedSender<Advertisement>>,
    links: Vec<(u64, mpsc::UnboundedSender<LinkEvent>)>,
    next_link_id: u64,
}

#[derive(Clone)]
pub struct LoopbackRadio {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackRadio {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PeripheralEvent>) {
        let (peripheral_tx, peripheral_rx) = mpsc::unbounded_channel();
        let radio = Self {
            shared: Arc::new(Mutex::new(Shared {
                powered: false,
                advertising: None,
                services: Vec::new(),
                peripheral: Some(peripheral_tx),
                scanners: Vec::new(),
                links: Vec::new(),
                next_link_id: 0,
            })),
        };
        (radio, peripheral_rx)
    }

    /// Simulate the adapter powering on or off. Powering off tears down
    /// advertising and notifies every established link.
    pub fn set_powered(&self, on: bool) {
        let mut shared = self.shared.lock().expect("loopback state poisoned");
        shared.powered = on;
        if !on {
            shared.advertising = None;
            shared.services.clear();
            for (_, link) in shared.links.drain(..) {
                let _ = link.send(LinkEvent::Disconnected {
                    reason: "adapter powered off".to_string(),
                });
            }
        }
        let state = if on {
            AdapterState::PoweredOn
        } else {
            AdapterState::PoweredOff
        };
        if let Some(peripheral) = &shared.peripheral {
            let _ = peripheral.send(PeripheralEvent::StateChange(state));
        }
    }

    /// Drop the peripheral side without notifying established links, as a
    /// crashed BLE stack would. Subsequent writes fail at the link level.
    pub fn close(&self) {
        let mut shared = self.shared.lock().expect("loopback state poisoned");
        shared.peripheral = None;
        shared.advertising = None;
    }
}

#[async_trait]
impl PeripheralRadio for LoopbackRadio {
    async fn start_advertising(&self, options: &AdvertisingOptions) -> Result<(), RadioError> {
        let mut shared = self.shared.lock().expect("loopback state poisoned");
        if !shared.powered {
            return Err(RadioError::PoweredOff);
        }
        debug!(
            name = %options.local_name,
            services = ?options.service_uuids,
            manufacturer_data = ?options.manufacturer_data,
            tx_power = options.tx_power_level,
            connectable = options.connectable,
            "Loopback advertising"
        );
        shared.advertising = Some(options.clone());

        let advertisement = Advertisement {
            name: options.local_name.clone(),
            id: LOOPBACK_DEVICE_ID.to_string(),
            rssi: LOOPBACK_RSSI,
        };
        shared
            .scanners
            .retain(|scanner| scanner.send(advertisement.clone()).is_ok());

        if let Some(peripheral) = &shared.peripheral {
            let _ = peripheral.send(PeripheralEvent::AdvertisingStarted);
        }
        Ok(())
    }

    async fn stop_advertising(&self) {
        let mut shared = self.shared.lock().expect("loopback state poisoned");
        shared.advertising = None;
    }

    async fn set_services(&self, services: Vec<ServiceDefinition>) -> Result<(), RadioError> {
        let mut shared = self.shared.lock().expect("loopback state poisoned");
        shared.services = services;
        Ok(())
    }
}

#[async_trait]
impl CentralRadio for LoopbackRadio {
    async fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<Advertisement>, RadioError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = self.shared.lock().expect("loopback state poisoned");
        if let Some(options) = &shared.advertising {
            let _ = tx.send(Advertisement {
                name: options.local_name.clone(),
                id: LOOPBACK_DEVICE_ID.to_string(),
                rssi: LOOPBACK_RSSI,
            });
        }
        shared.scanners.push(tx);
        Ok(rx)
    }

    async fn stop_scan(&self) {
        let mut shared = self.shared.lock().expect("loopback state poisoned");
        shared.scanners.clear();
    }

    async fn connect(
        &self,
        device_id: &str,
    ) -> Result<(Box<dyn CentralLink>, mpsc::UnboundedReceiver<LinkEvent>), RadioError> {
        let mut shared = self.shared.lock().expect("loopback state poisoned");
        let options = shared
            .advertising
            .as_ref()
            .ok_or(RadioError::PeripheralNotFound)?;
        if device_id != LOOPBACK_DEVICE_ID {
            return Err(RadioError::PeripheralNotFound);
        }
        if !options.connectable {
            return Err(RadioError::NotConnectable);
        }

        let peripheral = shared
            .peripheral
            .clone()
            .ok_or(RadioError::PeripheralNotFound)?;
        peripheral
            .send(PeripheralEvent::Connected {
                address: CENTRAL_ADDRESS.to_string(),
            })
            .map_err(|_| RadioError::PeripheralNotFound)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link_id = shared.next_link_id;
        shared.next_link_id += 1;
        shared.links.push((link_id, events_tx));

        debug!(link_id, "Loopback link established");
        let link = LoopbackLink {
            shared: self.shared.clone(),
            link_id,
            open: true,
            subscribed: false,
        };
        Ok((Box::new(link), events_rx))
    }
}

struct LoopbackLink {
    shared: Arc<Mutex<Shared>>,
    link_id: u64,
    open: bool,
    subscribed: bool,
}

impl LoopbackLink {
    fn peripheral(&self) -> Result<mpsc::UnboundedSender<PeripheralEvent>, RadioError> {
        let shared = self.shared.lock().expect("loopback state poisoned");
        shared
            .peripheral
            .clone()
            .ok_or_else(|| RadioError::LinkClosed("peripheral unavailable".to_string()))
    }

    fn teardown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut shared = self.shared.lock().expect("loopback state poisoned");
        shared.links.retain(|(id, _)| *id != self.link_id);
        if let Some(peripheral) = &shared.peripheral {
            if self.subscribed {
                self.subscribed = false;
                let _ = peripheral.send(PeripheralEvent::Unsubscribed);
            }
            let _ = peripheral.send(PeripheralEvent::Disconnected {
                address: CENTRAL_ADDRESS.to_string(),
            });
        }
    }
}

#[async_trait]
impl CentralLink for LoopbackLink {
    async fn discover(
        &mut self,
        service_uuid: &str,
        characteristic_uuid: &str,
    ) -> Result<(), RadioError> {
        // The peripheral registers its service table just after advertising
        // starts. Discovery is a round trip on real stacks, so model the
        // latency by yielding to the peripheral task while the table is
        // still empty.
        for _ in 0..64 {
            {
                let shared = self.shared.lock().expect("loopback state poisoned");
                if !shared.services.is_empty() {
                    let service = shared
                        .services
                        .iter()
                        .find(|service| service.uuid.eq_ignore_ascii_case(service_uuid))
                        .ok_or_else(|| RadioError::ServiceNotFound(service_uuid.to_string()))?;
                    let characteristic = service
                        .characteristics
                        .iter()
                        .find(|characteristic| {
                            characteristic.uuid.eq_ignore_ascii_case(characteristic_uuid)
                        })
                        .ok_or_else(|| {
                            RadioError::CharacteristicNotFound(characteristic_uuid.to_string())
                        })?;
                    debug!(
                        uuid = %characteristic.uuid,
                        read = characteristic.read,
                        write = characteristic.write,
                        notify = characteristic.notify,
                        description = ?characteristic.description,
                        "Characteristic located"
                    );
                    return Ok(());
                }
            }
            tokio::task::yield_now().await;
        }
        Err(RadioError::ServiceNotFound(service_uuid.to_string()))
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if !self.open {
            return Err(RadioError::LinkClosed("link already closed".to_string()));
        }
        let peripheral = self.peripheral()?;
        let (respond, outcome) = oneshot::channel();
        peripheral
            .send(PeripheralEvent::WriteRequest {
                value: payload.to_vec(),
                respond,
            })
            .map_err(|_| RadioError::LinkClosed("peripheral unavailable".to_string()))?;
        match outcome.await {
            Ok(WriteOutcome::Success) => Ok(()),
            Ok(WriteOutcome::Failure) => Err(RadioError::WriteRejected),
            Err(_) => Err(RadioError::LinkClosed("no response from peripheral".to_string())),
        }
    }

    async fn read(&mut self) -> Result<Vec<u8>, RadioError> {
        if !self.open {
            return Err(RadioError::LinkClosed("link already closed".to_string()));
        }
        let peripheral = self.peripheral()?;
        let (respond, outcome) = oneshot::channel();
        peripheral
            .send(PeripheralEvent::ReadRequest { respond })
            .map_err(|_| RadioError::LinkClosed("peripheral unavailable".to_string()))?;
        match outcome.await {
            Ok(ReadOutcome::Success(payload)) => Ok(payload),
            Ok(ReadOutcome::Failure) => Err(RadioError::ReadRejected),
            Err(_) => Err(RadioError::LinkClosed("no response from peripheral".to_string())),
        }
    }

    async fn subscribe(&mut self) -> Result<(), RadioError> {
        if !self.open {
            return Err(RadioError::LinkClosed("link already closed".to_string()));
        }
        let peripheral = self.peripheral()?;
        peripheral
            .send(PeripheralEvent::Subscribed)
            .map_err(|_| RadioError::LinkClosed("peripheral unavailable".to_string()))?;
        self.subscribed = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.teardown();
    }
}

impl Drop for LoopbackLink {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> AdvertisingOptions {
        AdvertisingOptions {
            local_name: "mypi".to_string(),
            service_uuids: vec!["1234".to_string()],
            manufacturer_data: b"SKB1".to_vec(),
            tx_power_level: 127,
            connectable: true,
        }
    }

    #[tokio::test]
    async fn advertising_requires_power() {
        let (radio, _events) = LoopbackRadio::new();
        assert!(matches!(
            PeripheralRadio::start_advertising(&radio, &options()).await,
            Err(RadioError::PoweredOff)
        ));
    }

    #[tokio::test]
    async fn scanners_see_advertisements_started_after_the_scan() {
        let (radio, _events) = LoopbackRadio::new();
        radio.set_powered(true);

        let mut advertisements = CentralRadio::start_scan(&radio).await.unwrap();
        PeripheralRadio::start_advertising(&radio, &options())
            .await
            .unwrap();

        let advertisement = advertisements.recv().await.unwrap();
        assert_eq!(advertisement.name, "mypi");
        assert_eq!(advertisement.id, LOOPBACK_DEVICE_ID);
    }

    #[tokio::test]
    async fn write_requests_reach_the_peripheral_event_stream() {
        let (radio, mut events) = LoopbackRadio::new();
        radio.set_powered(true);
        // Drain the power event.
        assert!(matches!(
            events.recv().await,
            Some(PeripheralEvent::StateChange(AdapterState::PoweredOn))
        ));

        PeripheralRadio::start_advertising(&radio, &options())
            .await
            .unwrap();
        assert!(matches!(
            events.recv().await,
            Some(PeripheralEvent::AdvertisingStarted)
        ));

        let (mut link, _link_events) =
            CentralRadio::connect(&radio, LOOPBACK_DEVICE_ID).await.unwrap();
        assert!(matches!(
            events.recv().await,
            Some(PeripheralEvent::Connected { .. })
        ));

        let writer = tokio::spawn(async move {
            link.write(b"stop").await.unwrap();
            link
        });

        match events.recv().await {
            Some(PeripheralEvent::WriteRequest { value, respond }) => {
                assert_eq!(value, b"stop");
                respond.send(WriteOutcome::Success).unwrap();
            }
            _ => panic!("expected a write request"),
        }
        let _link = writer.await.unwrap();
    }

    #[tokio::test]
    async fn connect_fails_when_nothing_advertises() {
        let (radio, _events) = LoopbackRadio::new();
        radio.set_powered(true);
        assert!(matches!(
            CentralRadio::connect(&radio, LOOPBACK_DEVICE_ID).await,
            Err(RadioError::PeripheralNotFound)
        ));
    }

    #[tokio::test]
    async fn writes_fail_once_the_peripheral_is_gone() {
        let (radio, _events) = LoopbackRadio::new();
        radio.set_powered(true);
        PeripheralRadio::start_advertising(&radio, &options())
            .await
            .unwrap();
        let (mut link, _link_events) =
            CentralRadio::connect(&radio, LOOPBACK_DEVICE_ID).await.unwrap();

        radio.close();
        assert!(matches!(
            link.write(b"accelerate").await,
            Err(RadioError::LinkClosed(_))
        ));
    }
}
