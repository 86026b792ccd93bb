//! Daemon configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Environment variable overriding the endpoint path.
pub const SOCKET_ENV: &str = "LLAMA_SOCKET";

/// File name of the endpoint inside its directory.
pub const SOCKET_NAME: &str = "llama.sock";

/// Per-user directory under `$HOME`.
pub const HOME_SUBDIR: &str = ".llama";

/// Mode for the endpoint's parent directory.
pub const SOCKET_DIR_MODE: u32 = 0o700;

/// How long bootstrap waits for an existing endpoint to answer `ping`.
///
/// An endpoint that accepts but stays silent this long is left in place and
/// bootstrap reports it as already running. Only refused connections and
/// protocol errors make an endpoint stale.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a request may take to arrive in full once it has started, and
/// how long a fresh connection may take to start its first one. Bounds the
/// drain on shutdown.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest request line the daemon reads, newline excluded.
pub const MAX_REQUEST_LINE: usize = 64 * 1024;

/// Version reported by `ping` and `status`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
