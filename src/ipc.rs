//! Local-socket JSON-RPC client for Avogadro2.
//!
//! Avogadro2 listens on a named local socket (`QLocalServer`) and accepts
//! JSON-RPC 2.0 requests. This module implements the client side of that
//! channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐        Unix Socket        ┌─────────────┐
//! │ RpcChannel                   │  ◄──────────────────────► │  Avogadro2  │
//! │  ├─ ConnectionManager        │   u32 length + JSON text  │             │
//! │  │   └─ Transport ───────────┼── TransportEvent queue    └─────────────┘
//! │  └─ FrameDecoder             │
//! └──────────────────────────────┘
//! ```
//!
//! - [`ConnectionManager`] owns the socket and the connected flag.
//! - [`RpcChannel`] builds requests, frames and writes them, and decodes
//!   whatever the peer sends back.
//! - A [`Transport`] reports socket activity as [`TransportEvent`]s through
//!   one queue; [`RpcChannel::process_events`] drains it.
//!
//! # Protocol
//!
//! ```text
//! <u32 BE length>{"jsonrpc":"2.0","id":"1","method":"loadMolecule","params":{...}}
//! ```
//!
//! Only `error` members of responses are interpreted. Responses are not
//! matched to request ids, and when several arrive at once only the last
//! one is looked at.
//!
//! # Usage
//!
//! ```ignore
//! use avogadro_rpc::ipc::RpcChannel;
//! use avogadro_rpc::RpcConfig;
//!
//! let mut channel = RpcChannel::new(&RpcConfig::default());
//! channel.send_molecule_update("xyz", "1\nhydrogen\nH 0 0 0").await;
//! channel.process_events_for(Duration::from_millis(200)).await;
//! ```

mod channel;
mod connection;
mod error;
mod framing;
mod protocol;
mod transport;

pub use channel::{RpcChannel, RpcEvent};
pub use connection::ConnectionManager;
pub use error::IpcError;
pub use framing::{
    encode_frame, read_frame, write_frame, FrameDecoder, FrameError, HEADER_SIZE, MAX_FRAME_SIZE,
};
pub use protocol::{
    DecodeError, MoleculeParams, Request, Response, RpcError, JSONRPC_VERSION, LOAD_MOLECULE,
};
pub use transport::{EventSink, LocalSocketTransport, Notification, Transport, TransportEvent};
