//! Connection state for the single outbound channel to Avogadro2.
//!
//! ```text
//!                connect()            Connected event
//! Disconnected ───────────► Connecting ───────────────► Connected
//!      ▲                        │                           │
//!      └────────────────────────┴───────────────────────────┘
//!            failure / timeout        Disconnected or Error event
//! ```
//!
//! `Connecting` only exists inside `connect()`; callers observe either
//! connected or not.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::RpcConfig;
use crate::ipc::error::IpcError;
use crate::ipc::transport::{EventSink, Notification, Transport, TransportEvent};

/// Owns the transport and tracks whether it is usable.
///
/// The connected flag is only ever set by a `Connected` event and cleared by
/// `Disconnected`/`Error` events or an explicit close. It is atomic so that
/// event handlers never hand the request path a torn value.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    server_name: String,
    connect_timeout: Duration,
    connected: AtomicBool,
    /// Incremented on every connection attempt; events carrying an older id
    /// come from a socket that has since been replaced.
    connection_id: u64,
    events_tx: UnboundedSender<Notification>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager for `config.server_name`. No connection is attempted
    /// until the first `connect`/`ensure_connected`.
    pub fn new(transport: T, config: &RpcConfig, events_tx: UnboundedSender<Notification>) -> Self {
        Self {
            transport,
            server_name: config.server_name.clone(),
            connect_timeout: config.connect_timeout,
            connected: AtomicBool::new(false),
            connection_id: 0,
            events_tx,
        }
    }

    /// Name used by `ensure_connected`.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Id of the most recent connection attempt.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Whether the transport holds a socket, acknowledged or not.
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Open AND acknowledged since the last disconnect.
    pub fn is_connected(&self) -> bool {
        self.transport.is_open() && self.connected.load(Ordering::SeqCst)
    }

    /// Connect to `server_name`, replacing any open socket.
    ///
    /// Returns false without touching the transport when the name is empty.
    pub async fn connect(&mut self, server_name: &str) -> bool {
        match self.try_connect(server_name).await {
            Ok(()) => self.is_connected(),
            Err(e) => {
                debug!(server = server_name, "Connection attempt failed: {}", e);
                false
            }
        }
    }

    /// [`connect`](Self::connect) with the failure reason.
    pub async fn try_connect(&mut self, server_name: &str) -> Result<(), IpcError> {
        if server_name.is_empty() {
            return Err(IpcError::EmptyServerName);
        }

        if self.transport.is_open() {
            debug!(server = %self.server_name, "Closing existing connection before reconnecting");
            self.transport.close();
        }
        self.connected.store(false, Ordering::SeqCst);

        self.server_name = server_name.to_string();
        self.connection_id += 1;
        let events = EventSink::new(self.connection_id, self.events_tx.clone());

        match timeout(
            self.connect_timeout,
            self.transport.connect_to_server(server_name, events),
        )
        .await
        {
            Ok(Ok(())) => {
                self.handle_event(self.connection_id, &TransportEvent::Connected);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.transport.close();
                Err(IpcError::ConnectTimeout(self.connect_timeout.as_millis() as u64))
            }
        }
    }

    /// True if already connected, otherwise reconnect to the configured name.
    pub async fn ensure_connected(&mut self) -> bool {
        match self.try_ensure_connected().await {
            Ok(()) => true,
            Err(e) => {
                debug!(server = %self.server_name, "Not connected: {}", e);
                false
            }
        }
    }

    /// [`ensure_connected`](Self::ensure_connected) with the failure reason.
    pub async fn try_ensure_connected(&mut self) -> Result<(), IpcError> {
        if self.is_connected() {
            return Ok(());
        }

        let server_name = self.server_name.clone();
        self.try_connect(&server_name).await?;

        if self.is_connected() {
            Ok(())
        } else {
            Err(IpcError::NotConnected)
        }
    }

    /// Apply a transport notification to the connection state.
    ///
    /// Events tagged with an older connection id are ignored. Data events do
    /// not affect connection state.
    pub fn handle_event(&self, connection_id: u64, event: &TransportEvent) {
        if connection_id != self.connection_id {
            trace!(
                stale = connection_id,
                current = self.connection_id,
                "Ignoring event from replaced connection"
            );
            return;
        }

        match event {
            TransportEvent::Connected => {
                info!(server = %self.server_name, "Connected");
                self.connected.store(true, Ordering::SeqCst);
            }
            TransportEvent::Disconnected => {
                if self.connected.swap(false, Ordering::SeqCst) {
                    info!(server = %self.server_name, "Disconnected");
                }
            }
            TransportEvent::Error(message) => {
                // Usually just means Avogadro2 is not running
                debug!(server = %self.server_name, "Socket error: {}", message);
                self.connected.store(false, Ordering::SeqCst);
            }
            TransportEvent::ReadyRead(_) => {}
        }
    }

    /// Write one complete frame.
    ///
    /// Refused while disconnected. A failed write marks the connection as
    /// lost so the next send reconnects.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), IpcError> {
        if !self.is_connected() {
            return Err(IpcError::NotConnected);
        }

        if let Err(e) = self.transport.write_all(frame).await {
            warn!(server = %self.server_name, "Write failed: {}", e);
            self.connected.store(false, Ordering::SeqCst);
            return Err(e);
        }

        Ok(())
    }

    /// Close the socket and clear the connected flag.
    pub fn disconnect(&mut self) {
        if self.transport.is_open() {
            debug!(server = %self.server_name, "Disconnecting");
            self.transport.close();
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
