//! # llama-store
//!
//! Content-addressed storage for invocation payloads.
//!
//! Remote function calls carry small messages, while the data flowing in and
//! out of a command (stdin, attached files, named outputs) can be large and is
//! often repeated between invocations. Instead of inlining bytes, requests
//! carry a [`Blob`] (a digest and a size) and both sides move the actual
//! bytes through a [`Store`].
//!
//! - [`ContentAddress`] - BLAKE3 digest, the lookup key
//! - [`Blob`] / [`File`] - value handles substituted for inline data
//! - [`Store`] - the put/get contract
//! - [`MemoryStore`] - ephemeral, for tests and single-process use
//! - [`DirStore`] - objects on a local (or mounted) directory

mod address;
mod blob;
mod dir;
mod error;
mod memory;
mod store;

pub use address::ContentAddress;
pub use blob::{Blob, File, FileMode};
pub use dir::DirStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{SharedStore, Store, open_store};
