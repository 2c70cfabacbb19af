//! JSON-RPC channel to Avogadro2.
//!
//! `RpcChannel` owns the [`ConnectionManager`], the request id counter and
//! the inbound frame decoder. Sends are fire-and-forget: nothing waits for a
//! reply, and replies are not correlated with request ids. An inbound error
//! is attributed to whatever was sent most recently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, warn};

use crate::config::RpcConfig;
use crate::ipc::connection::ConnectionManager;
use crate::ipc::error::IpcError;
use crate::ipc::framing::{encode_frame, FrameDecoder, FrameError};
use crate::ipc::protocol::{
    DecodeError, MoleculeParams, Request, Response, RpcError, LOAD_MOLECULE,
};
use crate::ipc::transport::{LocalSocketTransport, Notification, Transport, TransportEvent};

/// Events surfaced to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcEvent {
    /// Avogadro2 answered with a JSON-RPC error object.
    ApplicationError(RpcError),
    /// An inbound frame could not be interpreted.
    ProtocolError {
        /// Human-readable cause.
        reason: String,
        /// Offending payload, for diagnosis.
        raw: Vec<u8>,
    },
}

/// Client side of the Avogadro2 RPC socket.
///
/// # Example
///
/// ```ignore
/// use avogadro_rpc::{RpcChannel, RpcConfig};
///
/// let mut channel = RpcChannel::new(&RpcConfig::from_env());
/// if !channel.send_molecule_update("xyz", &xyz_text).await {
///     eprintln!("Avogadro2 is not running");
/// }
/// ```
pub struct RpcChannel<T: Transport = LocalSocketTransport> {
    connection: ConnectionManager<T>,
    events: UnboundedReceiver<Notification>,
    decoder: FrameDecoder,
    /// Connection whose bytes the decoder currently holds.
    decoder_connection: u64,
    /// Last id handed out; the first request gets 1.
    request_id: AtomicU64,
    reporter: Option<Sender<RpcEvent>>,
}

impl RpcChannel<LocalSocketTransport> {
    /// Channel over a Unix domain socket. Does not connect yet.
    pub fn new(config: &RpcConfig) -> Self {
        Self::with_transport(LocalSocketTransport::new(), config)
    }
}

impl<T: Transport> RpcChannel<T> {
    pub fn with_transport(transport: T, config: &RpcConfig) -> Self {
        let (events_tx, events) = unbounded_channel();
        Self {
            connection: ConnectionManager::new(transport, config, events_tx),
            events,
            decoder: FrameDecoder::new(),
            decoder_connection: 0,
            request_id: AtomicU64::new(0),
            reporter: None,
        }
    }

    /// Also deliver [`RpcEvent`]s to `reporter`, in addition to logging them.
    pub fn with_reporter(mut self, reporter: Sender<RpcEvent>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<T> {
        &mut self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Build a request with the next id.
    pub fn build_request(&self, method: &str, params: Value) -> Request {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst) + 1;
        Request::new(id, method, params)
    }

    /// Ask Avogadro2 to display `content`, given in `format`.
    ///
    /// Returns false if no connection could be established or the write
    /// failed. The reason is logged.
    pub async fn send_molecule_update(&mut self, format: &str, content: &str) -> bool {
        match self.try_send_molecule_update(format, content).await {
            Ok(request_id) => {
                debug!(id = %request_id, format, "Sent loadMolecule");
                true
            }
            Err(e) => {
                warn!(format, "Failed to send molecule update: {}", e);
                false
            }
        }
    }

    /// [`send_molecule_update`](Self::send_molecule_update) returning the
    /// request id on success and the failure reason otherwise.
    pub async fn try_send_molecule_update(
        &mut self,
        format: &str,
        content: &str,
    ) -> Result<String, IpcError> {
        // Pick up a peer close the caller has not dispatched yet, so a dead
        // socket is replaced instead of written to
        self.process_events();
        self.connection.try_ensure_connected().await?;
        self.sync_decoder();

        let params = MoleculeParams {
            format: format.to_string(),
            content: content.to_string(),
        };
        let request = self.build_request(LOAD_MOLECULE, serde_json::to_value(&params)?);

        let frame = encode_frame(&request.to_bytes()?)?;
        self.connection.write_frame(&frame).await?;

        Ok(request.id)
    }

    /// Dispatch every queued transport event without waiting.
    ///
    /// Returns the number of events handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(notification) = self.events.try_recv() {
            self.dispatch(notification);
            handled += 1;
        }
        handled
    }

    /// Wait for the next transport event and dispatch it.
    pub async fn process_next_event(&mut self) {
        // The manager holds a sender, so the queue never closes under us
        if let Some(notification) = self.events.recv().await {
            self.dispatch(notification);
        }
    }

    /// Keep dispatching events as they arrive until `duration` has elapsed.
    pub async fn process_events_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while let Ok(Some(notification)) = timeout_at(deadline, self.events.recv()).await {
            self.dispatch(notification);
        }
    }

    fn dispatch(&mut self, notification: Notification) {
        let Notification {
            connection_id,
            event,
        } = notification;

        match event {
            TransportEvent::ReadyRead(bytes) => {
                if connection_id == self.connection.connection_id() {
                    self.sync_decoder();
                    self.on_data_available(&bytes);
                } else {
                    debug!(bytes = bytes.len(), "Dropping data from replaced connection");
                }
            }
            other => self.connection.handle_event(connection_id, &other),
        }
    }

    /// Drop bytes buffered from a previous connection once a new one is in
    /// use; a partial frame never continues on another socket.
    fn sync_decoder(&mut self) {
        let current = self.connection.connection_id();
        if self.decoder_connection != current {
            if self.decoder.buffered_len() > 0 {
                debug!(
                    bytes = self.decoder.buffered_len(),
                    "Discarding partial frame from replaced connection"
                );
            }
            self.decoder.reset();
            self.decoder_connection = current;
        }
    }

    /// Feed received bytes to the decoder and handle the newest complete
    /// frame.
    ///
    /// When several frames complete in the same batch only the last one is
    /// interpreted; earlier ones are dropped. A partial trailing frame stays
    /// buffered for the next call.
    pub fn on_data_available(&mut self, bytes: &[u8]) {
        self.decoder.extend(bytes);

        match self.decoder.take_last_frame() {
            Ok(Some(frame)) => {
                self.handle_response(&frame);
                // A bad header may be left behind the frame just handled
                if let Err(e) = self.decoder.next_frame() {
                    self.frame_failed(e, bytes);
                }
            }
            Ok(None) => {}
            Err(e) => self.frame_failed(e, bytes),
        }
    }

    fn frame_failed(&mut self, e: FrameError, bytes: &[u8]) {
        self.report(RpcEvent::ProtocolError {
            reason: e.to_string(),
            raw: bytes.to_vec(),
        });
        self.decoder.reset();
    }

    /// Interpret one frame payload.
    ///
    /// Invalid JSON resets the decoder, dropping any buffered partial frame.
    /// Valid JSON that is not an object is reported but leaves the decoder
    /// alone, so a partial frame buffered behind it survives.
    pub fn handle_response(&mut self, bytes: &[u8]) {
        match Response::from_slice(bytes) {
            Ok(Response::Ack) => {
                debug!("Received acknowledgment");
            }
            Ok(Response::Error(err)) => {
                self.report(RpcEvent::ApplicationError(err));
            }
            Err(e @ DecodeError::InvalidJson(_)) => {
                self.report(RpcEvent::ProtocolError {
                    reason: e.to_string(),
                    raw: bytes.to_vec(),
                });
                self.decoder.reset();
            }
            Err(e @ DecodeError::NotAnObject) => {
                self.report(RpcEvent::ProtocolError {
                    reason: e.to_string(),
                    raw: bytes.to_vec(),
                });
            }
        }
    }

    /// Number of undecoded bytes held back waiting for the rest of a frame.
    pub fn buffered_len(&self) -> usize {
        self.decoder.buffered_len()
    }

    /// Close the connection so the peer sees a clean shutdown.
    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    fn report(&self, event: RpcEvent) {
        match &event {
            RpcEvent::ApplicationError(err) => {
                error!(code = ?err.code, error_message = %err.message, "Error received from Avogadro2");
            }
            RpcEvent::ProtocolError { reason, raw } => {
                warn!(
                    data = %String::from_utf8_lossy(raw),
                    "Malformed response from Avogadro2: {}",
                    reason
                );
            }
        }

        if let Some(reporter) = &self.reporter {
            let _ = reporter.send(event);
        }
    }
}
