//! Directory-backed store.
//!
//! Layout under the root:
//!
//! ```text
//! objects/ab/abcdef…   one file per object, named by full hex address
//! tmp/<uuid>           in-progress writes, renamed into objects/
//! ```
//!
//! The root may live on local disk or on a shared mount; writers on different
//! hosts only ever race to rename identical bytes into the same name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::address::ContentAddress;
use crate::blob::Blob;
use crate::error::{StoreError, StoreResult};
use crate::store::Store;

const OBJECTS_DIR: &str = "objects";
const TMP_DIR: &str = "tmp";

/// Content-addressed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open (and lay out, if needed) a store at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(OBJECTS_DIR)).await?;
        fs::create_dir_all(root.join(TMP_DIR)).await?;
        tracing::debug!(root = %root.display(), "opened blob store");
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, address: &ContentAddress) -> PathBuf {
        let hex = address.to_hex();
        self.root.join(OBJECTS_DIR).join(&hex[..2]).join(hex)
    }

    fn tmp_path(&self) -> PathBuf {
        self.root
            .join(TMP_DIR)
            .join(uuid::Uuid::new_v4().as_simple().to_string())
    }

    async fn write_new_object(&self, dest: &Path, data: &[u8]) -> StoreResult<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.tmp_path();
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Store for DirStore {
    async fn put(&self, data: &[u8]) -> StoreResult<Blob> {
        let blob = Blob::describe(data);
        let dest = self.object_path(&blob.address);

        match fs::metadata(&dest).await {
            Ok(meta) if meta.len() == blob.size => {
                tracing::trace!(address = %blob.address.short(), "blob already stored");
                return Ok(blob);
            }
            Ok(_) => {
                tracing::warn!(address = %blob.address.short(), "replacing truncated object");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.write_new_object(&dest, data).await?;
        tracing::trace!(address = %blob.address.short(), size = blob.size, "stored blob");
        Ok(blob)
    }

    async fn get(&self, blob: &Blob) -> StoreResult<Vec<u8>> {
        let path = self.object_path(&blob.address);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(blob.address));
            }
            Err(e) => return Err(e.into()),
        };
        blob.verify(&data)?;
        Ok(data)
    }
}
