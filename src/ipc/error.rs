//! Error types for the local-socket RPC client.

use thiserror::Error;

use crate::ipc::framing::FrameError;

/// IPC-specific error types.
///
/// Every variant is recoverable: the boolean-returning operations log the
/// error and report `false`, and the next send simply tries again.
#[derive(Debug, Error)]
pub enum IpcError {
    /// No server name was configured, so no connection was attempted.
    #[error("Server name is empty")]
    EmptyServerName,

    /// Failed to connect to the server socket.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    /// The transport did not signal connected within the attempt window.
    #[error("Connection attempt timed out after {0}ms")]
    ConnectTimeout(u64),

    /// A write was attempted without a live connection.
    #[error("Not connected")]
    NotConnected,

    /// Protocol-level error (serialization, framing).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl IpcError {
    /// Whether this error means the connection is unusable and the next send
    /// should reconnect.
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, IpcError::Protocol(_))
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                IpcError::ConnectionFailed(err)
            }
            _ => IpcError::Io(err),
        }
    }
}

impl From<FrameError> for IpcError {
    fn from(err: FrameError) -> Self {
        IpcError::Protocol(err.to_string())
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        IpcError::Protocol(format!("Failed to serialize request: {}", err))
    }
}
