//! Transport seam between the connection state machine and the socket.
//!
//! A transport reports what happens on the socket as [`TransportEvent`]s
//! pushed into a single queue. The connection manager and RPC channel react
//! to those events the same way no matter which transport produced them.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::resolve_socket_path;
use crate::ipc::error::IpcError;

/// Read buffer size for the socket reader task.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Notifications a transport delivers about its socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection attempt was acknowledged.
    Connected,
    /// The peer closed the socket or it was closed locally.
    Disconnected,
    /// The socket reported an error.
    Error(String),
    /// Bytes arrived and are ready to be decoded.
    ReadyRead(Vec<u8>),
}

/// A [`TransportEvent`] tagged with the connection attempt that produced it.
///
/// Tags let the manager ignore events from a socket it has already replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub connection_id: u64,
    pub event: TransportEvent,
}

/// Handle a transport uses to push events into the inbound queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    connection_id: u64,
    tx: UnboundedSender<Notification>,
}

impl EventSink {
    pub fn new(connection_id: u64, tx: UnboundedSender<Notification>) -> Self {
        Self { connection_id, tx }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Queue an event. Returns false once nobody is listening anymore.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Notification {
                connection_id: self.connection_id,
                event,
            })
            .is_ok()
    }
}

/// Byte-stream transport to a named local channel.
///
/// Implementations own the socket exclusively. `connect_to_server` must only
/// resolve successfully once the socket is usable; everything that happens
/// afterwards (peer close, errors, incoming bytes) is reported through the
/// [`EventSink`].
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Open a connection to `server_name`.
    async fn connect_to_server(&mut self, server_name: &str, events: EventSink)
        -> Result<(), IpcError>;

    /// Whether a socket is currently held open.
    fn is_open(&self) -> bool;

    /// Close the socket immediately without draining pending data.
    fn close(&mut self);

    /// Write one buffer to the socket in a single call.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), IpcError>;
}

/// Unix domain socket transport, compatible with Qt's `QLocalServer`.
#[derive(Debug, Default)]
pub struct LocalSocketTransport {
    writer: Option<OwnedWriteHalf>,
    reader_task: Option<JoinHandle<()>>,
}

impl LocalSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward everything the socket produces to the event queue until EOF.
    async fn read_loop(mut reader: OwnedReadHalf, events: EventSink) {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!(connection = events.connection_id(), "Socket closed by peer");
                    events.emit(TransportEvent::Disconnected);
                    return;
                }
                Ok(n) => {
                    trace!(connection = events.connection_id(), bytes = n, "Socket ready read");
                    if !events.emit(TransportEvent::ReadyRead(buf[..n].to_vec())) {
                        return;
                    }
                }
                Err(e) => {
                    warn!(connection = events.connection_id(), "Socket read error: {}", e);
                    events.emit(TransportEvent::Error(e.to_string()));
                    events.emit(TransportEvent::Disconnected);
                    return;
                }
            }
        }
    }
}

impl Transport for LocalSocketTransport {
    async fn connect_to_server(
        &mut self,
        server_name: &str,
        events: EventSink,
    ) -> Result<(), IpcError> {
        let socket_path = resolve_socket_path(server_name);
        debug!("Connecting to {}", socket_path.display());

        let stream = UnixStream::connect(&socket_path)
            .await
            .map_err(IpcError::ConnectionFailed)?;

        let (read_half, write_half) = stream.into_split();
        self.reader_task = Some(tokio::spawn(Self::read_loop(read_half, events)));
        self.writer = Some(write_half);

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn close(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        // Dropping the write half shuts down our side of the stream, so the
        // peer reads a regular EOF.
        self.writer = None;
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), IpcError> {
        let writer = self.writer.as_mut().ok_or(IpcError::NotConnected)?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for LocalSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::net::UnixListener;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn test_socket_path(test_name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "avogadro-rpc-transport-{}-{}.sock",
            test_name,
            std::process::id()
        ))
    }

    #[test]
    fn test_event_sink_tags_events() {
        let (tx, mut rx) = unbounded_channel();
        let sink = EventSink::new(3, tx);

        assert!(sink.emit(TransportEvent::Connected));
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification {
                connection_id: 3,
                event: TransportEvent::Connected,
            }
        );

        drop(rx);
        assert!(!sink.emit(TransportEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_connect_missing_socket_fails() {
        let (tx, _rx) = unbounded_channel();
        let mut transport = LocalSocketTransport::new();

        let path = test_socket_path("missing");
        let _ = std::fs::remove_file(&path);
        let result = transport
            .connect_to_server(path.to_str().unwrap(), EventSink::new(1, tx))
            .await;

        assert!(matches!(result, Err(IpcError::ConnectionFailed(_))));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_reader_reports_data_and_disconnect() {
        let path = test_socket_path("reader");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).expect("Failed to bind listener");

        let (tx, mut rx) = unbounded_channel();
        let mut transport = LocalSocketTransport::new();
        transport
            .connect_to_server(path.to_str().unwrap(), EventSink::new(1, tx))
            .await
            .expect("Connect failed");
        assert!(transport.is_open());

        let (mut server, _) = listener.accept().await.expect("Accept failed");
        server.write_all(b"ping").await.expect("Write failed");
        drop(server);

        let first = timeout(TEST_TIMEOUT, rx.recv())
            .await
            .expect("Test timed out")
            .unwrap();
        assert_eq!(first.event, TransportEvent::ReadyRead(b"ping".to_vec()));

        let second = timeout(TEST_TIMEOUT, rx.recv())
            .await
            .expect("Test timed out")
            .unwrap();
        assert_eq!(second.event, TransportEvent::Disconnected);

        transport.close();
        assert!(!transport.is_open());
        let _ = std::fs::remove_file(&path);
    }
}
