//! Daemon client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::{DaemonError, DaemonResult};
use crate::protocol::{Request, Response, StatusReport};

/// One connection to a running daemon.
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl DaemonClient {
    pub async fn dial(path: impl AsRef<Path>) -> DaemonResult<Self> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path)
            .await
            .map_err(|source| DaemonError::Connect {
                path: path.clone(),
                source,
            })?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Send one request and read its response.
    pub async fn call(&mut self, request: Request) -> DaemonResult<Response> {
        let mut line = serde_json::to_string(&request)
            .map_err(|e| DaemonError::Protocol(format!("encoding request: {e}")))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply).await? == 0 {
            return Err(DaemonError::Protocol("connection closed before reply".into()));
        }
        serde_json::from_str(reply.trim())
            .map_err(|e| DaemonError::Protocol(format!("invalid reply: {e}")))
    }

    /// Liveness probe. Returns the daemon's pid.
    pub async fn ping(&mut self) -> DaemonResult<u32> {
        match self.call(Request::Ping).await? {
            Response::Pong { pid, .. } => Ok(pid),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&mut self) -> DaemonResult<StatusReport> {
        match self.call(Request::Status).await? {
            Response::Status(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the daemon to stop. Returns once the request is acknowledged,
    /// not once the daemon has exited.
    pub async fn shutdown(&mut self) -> DaemonResult<()> {
        match self.call(Request::Shutdown).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> DaemonError {
    match response {
        Response::Error { message } => DaemonError::Remote(message),
        other => DaemonError::Protocol(format!("unexpected reply: {other:?}")),
    }
}

/// What answers at an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// A daemon replied to `ping` with its pid.
    Live(u32),
    /// Something accepted the connection but gave no reply in time.
    Unresponsive,
    /// Nothing is listening, or what answered does not speak the protocol.
    Dead,
}

/// Ping the endpoint at `path`, waiting at most `timeout` for a reply.
pub async fn liveness(path: &Path, timeout: Duration) -> Liveness {
    let attempt = async {
        let mut client = DaemonClient::dial(path).await?;
        let pid = client.ping().await?;
        Ok::<_, DaemonError>(pid)
    };
    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(pid)) => {
            tracing::debug!(path = %path.display(), pid, "endpoint answered");
            Liveness::Live(pid)
        }
        Ok(Err(e)) => {
            tracing::debug!(path = %path.display(), "endpoint dead: {e}");
            Liveness::Dead
        }
        Err(_) => {
            tracing::debug!(path = %path.display(), "endpoint did not answer in time");
            Liveness::Unresponsive
        }
    }
}

/// Whether a live daemon answers at `path` within `timeout`.
pub async fn probe(path: &Path, timeout: Duration) -> bool {
    matches!(liveness(path, timeout).await, Liveness::Live(_))
}
