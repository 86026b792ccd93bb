//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

/// Environment variable naming the store directory.
pub const STORE_ENV: &str = "LLAMA_STORE";

/// Environment variable naming the executor program.
pub const EXECUTOR_ENV: &str = "LLAMA_EXECUTOR";

/// Marker written to stderr before invocation logs.
pub const LOGS_BEGIN: &str = "==== invocation logs ====";

/// Marker written to stderr after invocation logs.
pub const LOGS_END: &str = "==== end logs ====";

/// Permission bits for output files written during reconciliation.
pub const OUTPUT_FILE_MODE: u32 = 0o644;
