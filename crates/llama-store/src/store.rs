//! The store contract.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::blob::Blob;
use crate::dir::DirStore;
use crate::error::StoreResult;

/// Content-addressed put/get.
///
/// Implementations must make `put` idempotent: storing the same bytes twice
/// yields equal blobs and keeps a single copy. Concurrent puts of identical
/// content commute; concurrent puts of different content never disturb each
/// other. There is no delete.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store `data`, returning its handle.
    async fn put(&self, data: &[u8]) -> StoreResult<Blob>;

    /// Fetch the bytes behind `blob`.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// content was never stored.
    async fn get(&self, blob: &Blob) -> StoreResult<Vec<u8>>;
}

/// Store handle shared between tasks.
pub type SharedStore = Arc<dyn Store>;

/// Open a directory-backed store, creating its layout if needed.
pub async fn open_store(root: impl AsRef<Path>) -> StoreResult<SharedStore> {
    let store = DirStore::open(root.as_ref()).await?;
    Ok(Arc::new(store))
}
