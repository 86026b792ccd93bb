//! In-memory store.
//!
//! Used for tests and for single-process runs where nothing crosses a
//! machine boundary. All data is lost when dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::address::ContentAddress;
use crate::blob::Blob;
use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// In-memory content-addressed store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<ContentAddress, Arc<[u8]>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct objects held.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, data: &[u8]) -> StoreResult<Blob> {
        let blob = Blob::describe(data);
        self.objects
            .write()
            .entry(blob.address)
            .or_insert_with(|| Arc::from(data));
        Ok(blob)
    }

    async fn get(&self, blob: &Blob) -> StoreResult<Vec<u8>> {
        let objects = self.objects.read();
        let data = objects
            .get(&blob.address)
            .ok_or(StoreError::NotFound(blob.address))?;
        blob.verify(data)?;
        Ok(data.to_vec())
    }
}
