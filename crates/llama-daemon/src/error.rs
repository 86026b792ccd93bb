//! Daemon errors.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// A daemon holds the endpoint. Expected; not a failure of the caller.
    #[error("llama daemon already running at {0:?}")]
    AlreadyRunning(PathBuf),

    #[error("binding {path:?}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("locking {path:?}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("connecting to {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Peer sent something that is not a valid reply.
    #[error("daemon protocol: {0}")]
    Protocol(String),

    /// The daemon answered with an error.
    #[error("daemon: {0}")]
    Remote(String),

    #[error("daemon task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
