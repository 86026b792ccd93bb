//! Advisory lock around endpoint bootstrap.
//!
//! Bind, probe, stale removal and rebind happen while holding an exclusive
//! `flock` on `<endpoint>.lock`, so concurrent bootstraps see each other's
//! listeners instead of racing to delete them. The lock file itself is never
//! removed.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use rustix::fs::{FlockOperation, flock};

use crate::endpoint::lock_path;
use crate::error::DaemonError;

/// Held exclusive lock. Released on drop when the descriptor closes.
#[derive(Debug)]
pub struct EndpointLock {
    path: PathBuf,
    _file: File,
}

impl EndpointLock {
    /// Block until the lock for `socket` is ours.
    pub async fn acquire(socket: &Path) -> Result<Self, DaemonError> {
        let path = lock_path(socket);
        let blocking_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&blocking_path)?;
            flock(&file, FlockOperation::LockExclusive)?;
            Ok(file)
        })
        .await?
        .map_err(|source| DaemonError::Lock {
            path: path.clone(),
            source,
        })?;
        tracing::trace!(path = %path.display(), "endpoint lock acquired");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("llama.sock");

        let first = EndpointLock::acquire(&socket).await.unwrap();
        assert!(first.path().exists());

        let waiter = tokio::spawn({
            let socket = socket.clone();
            async move { EndpointLock::acquire(&socket).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.path(), lock_path(&socket));
    }
}
