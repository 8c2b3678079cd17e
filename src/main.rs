mod domain;
mod infrastructure;

use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use domain::geo::{self, Coordinates};
use domain::models::{AppEvent, ControlError, MessageSeverity};
use domain::settings::SettingsService;
use infrastructure::bluetooth::gatt_server::{GattServer, GattServerConfig};
use infrastructure::bluetooth::loopback::LoopbackRadio;
use infrastructure::bluetooth::service::{ClientConfig, ControlService};
use infrastructure::bridge;
use infrastructure::logging;
use infrastructure::stub::ActuationStub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new().context("loading settings")?;
    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)?;
    // Persist effective settings so the file exists with all fields on first run
    if let Err(e) = settings_service.save() {
        warn!(error = %e, "Could not write settings file");
    }

    info!("Starting SkateBack control daemon");
    let settings = settings_service.get().clone();

    // Optional local stand-in for the motor-control process
    let stub = if std::env::args().any(|arg| arg == "--with-stub") {
        Some(
            ActuationStub::bind(&settings.actuation_addr)
                .await
                .context("binding actuation stub")?,
        )
    } else {
        None
    };

    let bridge = bridge::spawn(settings.actuation_addr.clone(), settings.bridge_backoff());

    // Peripheral side: GATT service on the in-process loopback radio.
    // Platform radio backends plug in through the same traits.
    let (radio, peripheral_events) = LoopbackRadio::new();
    let server = GattServer::new(
        Arc::new(radio.clone()),
        bridge,
        GattServerConfig::from_settings(&settings),
    );
    let server_task = tokio::spawn(server.run(peripheral_events));
    radio.set_powered(true);

    // Client side: control service plus a forwarder standing in for the UI.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                AppEvent::ConnectionState(state) => info!(?state, "Connection state"),
                AppEvent::DeviceFound(device) => {
                    info!(name = %device.name, rssi = device.rssi, "Device found")
                }
                AppEvent::Telemetry(snapshot) => {
                    debug!(speed = snapshot.speed, reverse = snapshot.reverse, "Telemetry")
                }
                AppEvent::LogMessage(message) => match message.severity {
                    MessageSeverity::Warning | MessageSeverity::Error => {
                        warn!("{}", message.message)
                    }
                    _ => info!("{}", message.message),
                },
            }
        }
    });

    let mut client = ControlService::new(
        Arc::new(radio.clone()),
        ClientConfig::from_settings(&settings),
        event_tx,
    );

    if let Err(e) = drive_demo_session(&mut client).await {
        warn!(error = %e, "Demo session failed");
    }

    info!("Demo session complete, press ctrl-c to exit");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    client.disconnect().await;
    radio.set_powered(false);
    radio.close();
    let _ = server_task.await;
    if let Some(stub) = stub {
        stub.shutdown();
    }
    Ok(())
}

/// Scripted end-to-end pass over the whole control plane: discovery,
/// connection, ramp up and down, reverse toggle, telemetry read and a
/// double-press emergency stop.
async fn drive_demo_session(client: &mut ControlService) -> Result<(), ControlError> {
    let device = client.scan().await?;
    client.connect(&device).await?;

    for _ in 0..3 {
        client.accelerate().await?;
        info!(
            duty = client.ramp().duty_cycle(),
            segment = client.ramp().segment(),
            "Accelerated"
        );
    }
    client.decelerate().await?;

    client.set_reverse(true).await?;
    client.set_reverse(false).await?;

    let telemetry = client.read_telemetry().await?;
    info!(speed = telemetry.speed, reverse = telemetry.reverse, "Board telemetry");

    // Return-to-base figures the excluded screen would render
    let here = Coordinates {
        latitude: 34.0722,
        longitude: -118.4441,
    };
    let base = Coordinates {
        latitude: 34.0689,
        longitude: -118.4452,
    };
    let distance = geo::distance_m(here, base);
    info!(
        distance_m = distance.round(),
        eta = ?geo::eta(distance, 2.5),
        "Return-to-base estimate"
    );

    // Emergency stop takes two deliberate taps
    let first_tap = Instant::now();
    client.stop_tap(first_tap).await?;
    client.stop_tap(Instant::now()).await?;

    client.disconnect().await;
    Ok(())
}
