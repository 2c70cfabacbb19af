//! Client configuration.
//!
//! Values come from built-in defaults, then environment variables, then
//! whatever the caller sets explicitly (the CLI maps its flags onto the
//! `with_*` builders).

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Server name Avogadro2 listens on by default.
pub const DEFAULT_SERVER_NAME: &str = "avogadro";

/// Default synchronous connect window.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Environment variable overriding the server name.
pub const SERVER_NAME_ENV: &str = "AVOGADRO_SERVER_NAME";

/// Environment variable overriding the connect timeout, in milliseconds.
pub const CONNECT_TIMEOUT_ENV: &str = "AVOGADRO_CONNECT_TIMEOUT_MS";

/// Connection settings for [`RpcChannel`](crate::ipc::RpcChannel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// Local channel name, or an explicit socket path.
    pub server_name: String,
    /// How long `connect` waits for the transport before reporting failure.
    pub connect_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl RpcConfig {
    /// Defaults overridden by `AVOGADRO_SERVER_NAME` and
    /// `AVOGADRO_CONNECT_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup(SERVER_NAME_ENV) {
            config.server_name = name;
        }

        if let Some(raw) = lookup(CONNECT_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.connect_timeout = Duration::from_millis(ms),
                Err(e) => warn!(
                    value = %raw,
                    "Ignoring invalid {}: {}",
                    CONNECT_TIMEOUT_ENV,
                    e
                ),
            }
        }

        config
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Socket path the configured server name resolves to.
    pub fn socket_path(&self) -> PathBuf {
        resolve_socket_path(&self.server_name)
    }
}

/// Resolve a local channel name to a socket path.
///
/// A name containing a path separator is used verbatim. A bare name lives in
/// the temporary directory (`$TMPDIR`, falling back to `/tmp`), which is
/// where `QLocalServer` creates its socket on Unix.
pub fn resolve_socket_path(server_name: &str) -> PathBuf {
    if server_name.contains(std::path::MAIN_SEPARATOR) {
        PathBuf::from(server_name)
    } else {
        std::env::temp_dir().join(server_name)
    }
}
