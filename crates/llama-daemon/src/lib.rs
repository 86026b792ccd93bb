//! # llama-daemon
//!
//! Per-user daemon behind a unix socket. This crate owns the endpoint's
//! lifecycle:
//!
//! - resolving where the endpoint lives ([`socket_path`])
//! - binding it exactly once per user, recovering endpoints left behind by a
//!   dead daemon ([`start`])
//! - answering liveness probes and draining on shutdown ([`DaemonHandle`])
//!
//! Bootstrap attempts are serialized with an advisory lock on
//! `<endpoint>.lock`, so two daemons racing for a stale endpoint cannot both
//! win.

pub mod client;
pub mod constants;
pub mod endpoint;
pub mod error;
pub mod lock;
pub mod protocol;
pub mod server;

pub use client::{DaemonClient, Liveness, liveness, probe};
pub use endpoint::{ensure_parent, resolve_socket_path, socket_path};
pub use error::{DaemonError, DaemonResult};
pub use protocol::{Request, Response, StatusReport};
pub use server::{DaemonHandle, run, start, start_with};
