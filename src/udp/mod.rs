//! # UDP Numeric Link
//!
//! Localhost datagram channel carrying small JSON messages:
//!
//! ```json
//! {"type": "number", "data": {"value": 42}, "timestamp": 1760000000000}
//! ```
//!
//! One listener per link. Messages of type `number` update
//! [`UdpLinkState::current_number`]; every well-formed message becomes
//! [`UdpLinkState::last_message`]. Malformed datagrams are dropped.

use bytes::BytesMut;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default link port
pub const DEFAULT_UDP_PORT: u16 = 8080;

/// Largest accepted datagram (bytes)
pub const MAX_DATAGRAM: usize = 1024;

/// Largest value accepted by [`UdpLink::send_number`]
pub const MAX_NUMBER: u32 = 1_000_000;

/// Message type carrying `{"value": n}`
pub const NUMBER_MESSAGE: &str = "number";

/// Pause after a receive error before reading again
const RECV_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// UDP link errors
#[derive(Debug, Error)]
pub enum UdpError {
    #[error("Already listening on port {0}")]
    AlreadyListening(u16),

    #[error("Number must be between 0-1000000, got {0}")]
    NumberOutOfRange(u32),

    #[error("Failed to bind: {0}")]
    Bind(std::io::Error),

    #[error("Failed to send: {0}")]
    Send(std::io::Error),

    #[error("Failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One datagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdpMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub data: Value,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl UdpMessage {
    /// Message stamped with the current time
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            timestamp: u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default(),
        }
    }

    /// `data.value` of a `number` message
    pub fn number(&self) -> Option<u32> {
        if self.message_type != NUMBER_MESSAGE {
            return None;
        }
        self.data
            .get("value")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }
}

/// Observable link state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UdpLinkState {
    pub is_listening: bool,
    pub port: Option<u16>,
    pub current_number: Option<u32>,
    pub last_message: Option<UdpMessage>,
}

struct Listener {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    port: u16,
}

/// Datagram listener and sender
pub struct UdpLink {
    state: Arc<watch::Sender<UdpLinkState>>,
    listener: Mutex<Option<Listener>>,
}

impl Default for UdpLink {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpLink {
    pub fn new() -> Self {
        let (state, _) = watch::channel(UdpLinkState::default());
        Self {
            state: Arc::new(state),
            listener: Mutex::new(None),
        }
    }

    /// Bind `127.0.0.1:port` and start receiving
    ///
    /// Returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// `AlreadyListening` if a listener is running, `Bind` if the port is taken.
    pub async fn start_listening(&self, port: u16) -> Result<u16, UdpError> {
        let mut listener = self.listener.lock().await;
        if let Some(active) = listener.as_ref() {
            return Err(UdpError::AlreadyListening(active.port));
        }

        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(UdpError::Bind)?;
        let bound = socket.local_addr().map_err(UdpError::Bind)?.port();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(receive(socket, Arc::clone(&self.state), cancel.clone()));
        *listener = Some(Listener {
            handle,
            cancel,
            port: bound,
        });

        self.state.send_modify(|s| {
            s.is_listening = true;
            s.port = Some(bound);
        });
        info!("Listening on UDP port {}", bound);
        Ok(bound)
    }

    /// Stop the listener and clear received values
    ///
    /// Returns false if nothing was listening.
    pub async fn stop_listening(&self) -> bool {
        let Some(active) = self.listener.lock().await.take() else {
            return false;
        };

        active.cancel.cancel();
        let _ = active.handle.await;
        self.state.send_replace(UdpLinkState::default());
        info!("Stopped listening on UDP port {}", active.port);
        true
    }

    /// Send `{"type": "number", "data": {"value": number}}` to `127.0.0.1:port`
    pub async fn send_number(&self, number: u32, port: u16) -> Result<(), UdpError> {
        if number > MAX_NUMBER {
            return Err(UdpError::NumberOutOfRange(number));
        }
        self.send_message(NUMBER_MESSAGE, serde_json::json!({ "value": number }), port)
            .await
    }

    /// Send a typed message to `127.0.0.1:port` from an ephemeral socket
    pub async fn send_message(
        &self,
        message_type: &str,
        data: Value,
        port: u16,
    ) -> Result<(), UdpError> {
        let message = UdpMessage::new(message_type, data);
        let payload = serde_json::to_vec(&message)?;

        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(UdpError::Send)?;
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        socket.send_to(&payload, target).await.map_err(UdpError::Send)?;

        debug!("Sent {} message ({} bytes) to {}", message_type, payload.len(), target);
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<UdpLinkState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> UdpLinkState {
        self.state.borrow().clone()
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        if let Some(active) = self.listener.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

async fn receive(
    socket: UdpSocket,
    state: Arc<watch::Sender<UdpLinkState>>,
    cancel: CancellationToken,
) {
    let mut buf = BytesMut::zeroed(MAX_DATAGRAM);

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf[..]) => received,
        };

        match received {
            Ok((len, from)) => match serde_json::from_slice::<UdpMessage>(&buf[..len]) {
                Ok(message) => {
                    debug!("UDP {} message from {}", message.message_type, from);
                    let number = message.number();
                    state.send_modify(|s| {
                        if let Some(n) = number {
                            s.current_number = Some(n);
                        }
                        s.last_message = Some(message);
                    });
                }
                Err(e) => debug!("Ignoring malformed datagram from {}: {}", from, e),
            },
            Err(e) => {
                warn!("UDP receive error: {}", e);
                tokio::time::sleep(RECV_ERROR_PAUSE).await;
            }
        }
    }

    debug!("UDP listener task ended");
}
