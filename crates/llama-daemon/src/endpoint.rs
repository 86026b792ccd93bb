//! Endpoint resolution.
//!
//! `LLAMA_SOCKET` wins; otherwise `$HOME/.llama/llama.sock`; with no home
//! directory, `/run/llama-<uid>/llama.sock`.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::constants::{HOME_SUBDIR, SOCKET_DIR_MODE, SOCKET_ENV, SOCKET_NAME};

/// Resolve the endpoint from an override, a home directory, and a uid.
pub fn resolve_socket_path(over: Option<&str>, home: Option<&Path>, uid: u32) -> PathBuf {
    if let Some(over) = over.filter(|v| !v.is_empty()) {
        return shellexpand::tilde(over).as_ref().into();
    }
    match home {
        Some(home) => home.join(HOME_SUBDIR).join(SOCKET_NAME),
        None => PathBuf::from(format!("/run/llama-{uid}")).join(SOCKET_NAME),
    }
}

/// Endpoint for the current process.
pub fn socket_path() -> PathBuf {
    let over = std::env::var(SOCKET_ENV).ok();
    resolve_socket_path(
        over.as_deref(),
        dirs::home_dir().as_deref(),
        rustix::process::getuid().as_raw(),
    )
}

/// Sibling file used to serialize bootstrap attempts.
pub fn lock_path(socket: &Path) -> PathBuf {
    let mut name = OsString::from(socket.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Create the endpoint's parent directory, owner-only, if missing.
pub async fn ensure_parent(socket: &Path) -> io::Result<()> {
    let Some(parent) = socket.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(SOCKET_DIR_MODE)
        .create(parent)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_override_wins() {
        let path = resolve_socket_path(Some("/tmp/x.sock"), Some(Path::new("/home/u")), 1000);
        assert_eq!(path, PathBuf::from("/tmp/x.sock"));
    }

    #[test]
    fn test_empty_override_ignored() {
        let path = resolve_socket_path(Some(""), Some(Path::new("/home/u")), 1000);
        assert_eq!(path, PathBuf::from("/home/u/.llama/llama.sock"));
    }

    #[test]
    fn test_home_default() {
        let path = resolve_socket_path(None, Some(Path::new("/home/u")), 1000);
        assert_eq!(path, PathBuf::from("/home/u/.llama/llama.sock"));
    }

    #[test]
    fn test_uid_fallback() {
        let path = resolve_socket_path(None, None, 1234);
        assert_eq!(path, PathBuf::from("/run/llama-1234/llama.sock"));
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("/run/llama-1/llama.sock")),
            PathBuf::from("/run/llama-1/llama.sock.lock")
        );
    }

    #[tokio::test]
    async fn test_ensure_parent_is_private() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("a/b/llama.sock");
        ensure_parent(&socket).await.unwrap();
        let mode = std::fs::metadata(dir.path().join("a/b")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, SOCKET_DIR_MODE);
        // Idempotent.
        ensure_parent(&socket).await.unwrap();
    }
}
