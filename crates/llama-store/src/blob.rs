//! Blob and file handles.
//!
//! A [`Blob`] stands in for inline bytes: it names content already put into a
//! [`Store`]. A [`File`] adds the permission bits needed to restore a local
//! file on the far side.

use std::fmt;
use std::os::unix::fs::PermissionsExt;

use serde::{Deserialize, Serialize};

use crate::address::ContentAddress;
use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Reference to bytes held in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blob {
    pub address: ContentAddress,
    pub size: u64,
}

impl Blob {
    /// Describe `data` without storing it.
    pub fn describe(data: &[u8]) -> Self {
        Self {
            address: ContentAddress::of(data),
            size: data.len() as u64,
        }
    }

    /// Verify that `data` is the content this blob names.
    pub fn verify(&self, data: &[u8]) -> StoreResult<()> {
        if data.len() as u64 != self.size {
            return Err(StoreError::corrupt(
                self.address,
                format!("expected {} bytes, found {}", self.size, data.len()),
            ));
        }
        if ContentAddress::of(data) != self.address {
            return Err(StoreError::corrupt(self.address, "digest mismatch"));
        }
        Ok(())
    }
}

/// POSIX mode bits (permissions and file type).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMode(pub u32);

impl FileMode {
    /// Permission bits only.
    pub fn permissions(self) -> u32 {
        self.0 & 0o7777
    }
}

impl fmt::Debug for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileMode({:o})", self.0)
    }
}

impl From<u32> for FileMode {
    fn from(mode: u32) -> Self {
        Self(mode)
    }
}

/// A stored file: content plus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    #[serde(flatten)]
    pub blob: Blob,
    pub mode: FileMode,
}

impl File {
    /// Store `data` and pair it with `mode`.
    pub async fn put(store: &dyn Store, data: &[u8], mode: FileMode) -> StoreResult<Self> {
        let blob = store.put(data).await?;
        Ok(Self { blob, mode })
    }

    /// Capture the mode of a local file from its metadata.
    pub fn mode_of(meta: &std::fs::Metadata) -> FileMode {
        FileMode(meta.permissions().mode())
    }
}
