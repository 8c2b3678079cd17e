//! Bluetooth Module
//!
//! The control-plane protocol between the handheld remote and the board.
//!
//! ## Architecture
//!
//! ```text
//!            client side                      peripheral side
//! ┌───────────────────────────┐      ┌────────────────────────────┐
//! │       ControlService      │      │         GattServer         │
//! │ (scan/connect/send/read)  │      │ (advertise, decode, relay) │
//! └──────┬──────────┬─────────┘      └──────────────┬─────────────┘
//!        │          │                               │
//!        ▼          ▼                               ▼
//! ┌───────────┐ ┌────────────┐   ┌──────────┐ ┌───────────────┐
//! │  Scanner  │ │ Connection │   │ Protocol │ │ PeripheralRadio│
//! └───────────┘ └────────────┘   └──────────┘ └───────────────┘
//!        \          │                  ▲
//!         ▼         ▼                  │
//!       ┌──────────────────────────────┴──┐
//!       │  link (radio capability traits) │
//!       └─────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Service identity, command codec, telemetry codec
//! - [`link`] - Radio capability traits for both roles
//! - [`scanner`] - Name-filtered device discovery with a hard timeout
//! - [`connection`] - Link-level connect plus mandatory discovery
//! - [`service`] - Client-side coordinator and drive surface
//! - [`gatt_server`] - Peripheral service bridging the link to actuation
//! - [`loopback`] - In-process radio used by tests and the demo binary

pub mod connection;
pub mod gatt_server;
pub mod link;
pub mod loopback;
pub mod protocol;
pub mod scanner;
pub mod service;

// Re-export the two entry points for convenience
pub use gatt_server::GattServer;
pub use service::ControlService;
