//! # llama-client
//!
//! Client side of a llama invocation: turns a command line into an
//! [`InvocationSpec`](llama_protocol::InvocationSpec), dispatches it through a
//! [`Backend`], and writes the results back to local files and streams.
//!
//! Nothing here reaches for ambient state. The store, the backend, and the
//! options are handed to an [`Invoker`] by the caller.

pub mod argspec;
pub mod backend;
pub mod config;
pub mod constants;
pub mod files;
pub mod invoke;

pub use argspec::{ArgSpecError, OutputMap, encode_arg, encode_args};
pub use backend::{Backend, CommandBackend, RemoteError, SharedBackend};
pub use config::{Config, ConfigError};
pub use files::{FileSpec, FileSpecError, prepare_files, validate_files};
pub use invoke::{InvokeError, InvokeOptions, Invoker, ReconcileReport, write_logs};
