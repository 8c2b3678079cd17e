use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Control vocabulary exchanged with the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Accelerate,
    Decelerate,
    Stop,
    ReverseSet(bool),
}

/// Connection lifecycle as seen by one side of the link.
///
/// Commands may only be sent from `Ready`; a send attempted in any other
/// state is rejected locally with [`ControlError::NotConnected`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Ready,
    Disconnected(String),
    Failed(String),
}

/// A peripheral seen during a scan session. Records are collected during one
/// session and discarded at the start of the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub name: String,
    pub id: String,
    pub rssi: i16,
}

/// Decoded read-response payload from the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub speed: u32,
    pub reverse: bool,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionState(ConnectionState),
    DeviceFound(DeviceRecord),
    Telemetry(TelemetrySnapshot),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// Errors surfaced to the presentation layer by the control client.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no matching peripheral found before the scan deadline")]
    ScanTimeout,
    #[error("a scan session is already running")]
    ScanInProgress,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("not connected")]
    NotConnected,
    #[error("link error: {0}")]
    LinkError(String),
}
