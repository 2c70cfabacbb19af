//! Avogadro2 RPC client library
//!
//! Sends molecules to a running Avogadro2 over its local JSON-RPC socket:
//!
//! - `ipc` - connection management, framing and JSON-RPC messages
//! - `config` - server name and connect timeout, from defaults and env
//!
//! ```ignore
//! use avogadro_rpc::{RpcChannel, RpcConfig};
//!
//! let mut channel = RpcChannel::new(&RpcConfig::from_env());
//! if channel.send_molecule_update("xyz", &content).await {
//!     channel.process_events_for(Duration::from_millis(200)).await;
//! }
//! channel.disconnect();
//! ```

pub mod config;
pub mod ipc;

pub use config::RpcConfig;
pub use ipc::{IpcError, RpcChannel, RpcEvent};
