//! Actuation Bridge
//!
//! Persistent client connection from the peripheral process to the local
//! actuation process. The bridge never gives up: on any socket error it
//! tears the connection down and retries after a fixed backoff, since the
//! actuation process restarts independently of the BLE service. Commands
//! issued while the socket is down are dropped rather than queued; a stale
//! motion command replayed after a reconnect gap is unsafe.

use crate::domain::models::Command;
use crate::infrastructure::bluetooth::protocol;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owning handle for the bridge task. Dropping it (or calling
/// [`shutdown`](BridgeHandle::shutdown)) cancels the retry loop.
pub struct BridgeHandle {
    sender: mpsc::UnboundedSender<Command>,
    connected: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    /// Fire-and-forget send. The command is silently dropped when the
    /// actuation link is down.
    pub fn send(&self, command: Command) {
        let _ = self.sender.send(command);
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Observe connection state changes, mainly for tests and status logs.
    pub fn connected_watch(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Stop the retry loop and wait for the task to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.task.await;
    }
}

/// Spawn the bridge task connecting to `addr` with the given reconnect
/// backoff.
pub fn spawn(addr: String, backoff: Duration) -> BridgeHandle {
    let (sender, receiver) = mpsc::unbounded_channel();
    let (state_tx, connected) = watch::channel(false);
    let task = tokio::spawn(run(addr, backoff, receiver, state_tx));
    BridgeHandle {
        sender,
        connected,
        task,
    }
}

enum Disconnect {
    /// All senders gone; the bridge is being shut down.
    HandleDropped,
    /// The actuation process went away; reconnect after the backoff.
    SocketClosed,
}

async fn run(
    addr: String,
    backoff: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<bool>,
) {
    loop {
        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%addr, error = %e, "Actuation endpoint unreachable, retrying");
                if !drop_commands_for(&mut commands, backoff).await {
                    return;
                }
                continue;
            }
        };

        info!(%addr, "Connected to actuation process");
        let _ = state.send(true);
        let disconnect = serve(stream, &mut commands).await;
        let _ = state.send(false);

        match disconnect {
            Disconnect::HandleDropped => return,
            Disconnect::SocketClosed => {
                warn!(%addr, "Actuation connection lost, reconnecting");
                if !drop_commands_for(&mut commands, backoff).await {
                    return;
                }
            }
        }
    }
}

/// Forward commands and log responses until either side goes away.
async fn serve(stream: TcpStream, commands: &mut mpsc::UnboundedReceiver<Command>) -> Disconnect {
    let (reader, mut writer) = stream.into_split();
    let mut responses = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    let mut frame = protocol::encode(&command).to_vec();
                    frame.push(b'\n');
                    if let Err(e) = writer.write_all(&frame).await {
                        warn!(?command, error = %e, "Actuation write failed");
                        return Disconnect::SocketClosed;
                    }
                    debug!(?command, "Forwarded to actuation process");
                }
                None => return Disconnect::HandleDropped,
            },
            response = responses.next_line() => match response {
                // Responses are operational logs, not a protocol.
                Ok(Some(line)) => info!(response = %line, "Actuation process"),
                Ok(None) => return Disconnect::SocketClosed,
                Err(e) => {
                    warn!(error = %e, "Actuation read failed");
                    return Disconnect::SocketClosed;
                }
            },
        }
    }
}

/// Sit out the reconnect backoff, dropping commands issued in the window.
/// Returns false when the handle has been dropped.
async fn drop_commands_for(commands: &mut mpsc::UnboundedReceiver<Command>, backoff: Duration) -> bool {
    let deadline = tokio::time::sleep(backoff);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => return true,
            command = commands.recv() => match command {
                Some(command) => debug!(?command, "Actuation link down, dropping command"),
                None => return false,
            },
        }
    }
}
