//! Actuation Stub
//!
//! Development stand-in for the motor-control process: a loopback TCP
//! listener that accepts newline-delimited command tokens and answers with
//! the real process's textual replies. Used by the demo binary and the
//! test suite; never part of the peripheral service itself.

use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct ActuationStub {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ActuationStub {
    pub async fn bind(addr: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "Actuation stub listening");
        let task = tokio::spawn(accept_loop(listener));
        Ok(Self { addr, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(%peer, "Actuation client connected");
                tokio::spawn(handle_client(stream));
            }
            Err(e) => warn!(error = %e, "Actuation stub accept failed"),
        }
    }
}

async fn handle_client(stream: TcpStream) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        info!(%command, "Actuation stub received");

        let reply = match command {
            "accelerate" => "Successfully accelerated".to_string(),
            "decelerate" => "Successfully decelerated".to_string(),
            "stop" => "Successfully stopped".to_string(),
            other => format!("Unknown command: {other}"),
        };
        let mut frame = reply.into_bytes();
        frame.push(b'\n');
        if writer.write_all(&frame).await.is_err() {
            break;
        }
    }
    info!("Actuation client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exchange(stub_addr: SocketAddr, token: &str) -> String {
        let stream = TcpStream::connect(stub_addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(format!("{token}\n").as_bytes()).await.unwrap();
        let mut lines = BufReader::new(reader).lines();
        lines.next_line().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn known_commands_get_success_replies() {
        let stub = ActuationStub::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(
            exchange(stub.addr(), "accelerate").await,
            "Successfully accelerated"
        );
        assert_eq!(
            exchange(stub.addr(), "decelerate").await,
            "Successfully decelerated"
        );
        assert_eq!(exchange(stub.addr(), "stop").await, "Successfully stopped");
        stub.shutdown();
    }

    #[tokio::test]
    async fn unknown_tokens_are_echoed_back() {
        let stub = ActuationStub::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(
            exchange(stub.addr(), "reverse_on").await,
            "Unknown command: reverse_on"
        );
        stub.shutdown();
    }

    #[tokio::test]
    async fn multiple_commands_per_connection() {
        let stub = ActuationStub::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(stub.addr()).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"accelerate\nstop\n").await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "Successfully accelerated"
        );
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "Successfully stopped"
        );
        stub.shutdown();
    }
}
