//! Daemon bootstrap and serve loop.
//!
//! [`start`] binds the endpoint (recovering a stale one), spawns the accept
//! loop and hands back a [`DaemonHandle`]. Cancelling the handle's token stops
//! the accept loop; connections that are mid-request are drained before the
//! serve task finishes.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::client::{Liveness, liveness};
use crate::constants::{MAX_REQUEST_LINE, PROBE_TIMEOUT, REQUEST_TIMEOUT, VERSION};
use crate::endpoint::ensure_parent;
use crate::error::{DaemonError, DaemonResult};
use crate::lock::EndpointLock;
use crate::protocol::{Request, Response, StatusReport};

/// A running daemon.
pub struct DaemonHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl DaemonHandle {
    /// Token that stops the daemon when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the serve task to finish: cancellation plus drain.
    pub async fn wait(self) -> DaemonResult<()> {
        self.join.await?;
        Ok(())
    }

    /// Cancel and wait for the drain to complete.
    pub async fn shutdown(self) -> DaemonResult<()> {
        self.cancel.cancel();
        self.wait().await
    }
}

/// Start a daemon on `path` with a fresh cancellation token.
pub async fn start(path: impl AsRef<Path>) -> DaemonResult<DaemonHandle> {
    start_with(path, CancellationToken::new()).await
}

/// Start a daemon on `path`, stopped by `cancel`.
///
/// Fails with [`DaemonError::AlreadyRunning`] when a daemon answers on the
/// endpoint, or accepts without answering within [`PROBE_TIMEOUT`]. A stale
/// endpoint is removed and rebound once.
pub async fn start_with(
    path: impl AsRef<Path>,
    cancel: CancellationToken,
) -> DaemonResult<DaemonHandle> {
    let path = path.as_ref().to_path_buf();
    ensure_parent(&path).await?;

    let lock = EndpointLock::acquire(&path).await?;
    let listener = bind(&path).await?;
    let identity = SocketIdentity::of(&path)?;

    let state = Arc::new(ServerState::new(cancel.clone()));
    tracing::info!(path = %path.display(), pid = std::process::id(), "llama daemon listening");

    // Spawned before the lock is released so a waiting bootstrap's probe
    // finds a live listener.
    let join = tokio::spawn(serve(listener, path, identity, state));
    drop(lock);

    Ok(DaemonHandle { cancel, join })
}

/// Serve on `path` until `cancel` fires, then drain and return.
pub async fn run(path: impl AsRef<Path>, cancel: CancellationToken) -> DaemonResult<()> {
    start_with(path, cancel).await?.wait().await
}

async fn bind(path: &Path) -> DaemonResult<UnixListener> {
    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            match liveness(path, PROBE_TIMEOUT).await {
                Liveness::Live(_) => return Err(DaemonError::AlreadyRunning(path.to_path_buf())),
                Liveness::Unresponsive => {
                    tracing::warn!(path = %path.display(), "endpoint accepts but does not answer; leaving it");
                    return Err(DaemonError::AlreadyRunning(path.to_path_buf()));
                }
                Liveness::Dead => {}
            }
            tracing::info!(path = %path.display(), "removing stale endpoint");
            remove_if_exists(path).await?;
            UnixListener::bind(path).map_err(|source| DaemonError::Bind {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(DaemonError::Bind {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Device and inode of the socket file we bound.
///
/// Used on shutdown so we never remove an endpoint a newer daemon has since
/// bound at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SocketIdentity {
    dev: u64,
    ino: u64,
}

impl SocketIdentity {
    fn of(path: &Path) -> io::Result<Self> {
        let meta = std::fs::symlink_metadata(path)?;
        Ok(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }
}

struct ServerState {
    started: Instant,
    served: AtomicU64,
    active: AtomicU64,
    cancel: CancellationToken,
}

impl ServerState {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            started: Instant::now(),
            served: AtomicU64::new(0),
            active: AtomicU64::new(0),
            cancel,
        }
    }

    fn handle(&self, request: Request) -> Response {
        self.served.fetch_add(1, Ordering::Relaxed);
        match request {
            Request::Ping => Response::Pong {
                pid: std::process::id(),
                version: VERSION.to_string(),
            },
            Request::Status => Response::Status(StatusReport {
                pid: std::process::id(),
                version: VERSION.to_string(),
                uptime_secs: self.started.elapsed().as_secs(),
                requests_served: self.served.load(Ordering::Relaxed),
                active_connections: self.active.load(Ordering::Relaxed),
            }),
            Request::Shutdown => {
                tracing::info!("shutdown requested");
                self.cancel.cancel();
                Response::Ack
            }
        }
    }
}

/// Decrements the open-connection count when the connection task ends.
struct ActiveGuard<'a>(&'a AtomicU64);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn serve(
    listener: UnixListener,
    path: PathBuf,
    identity: SocketIdentity,
    state: Arc<ServerState>,
) {
    let tracker = TaskTracker::new();
    let cancel = state.cancel.clone();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&state);
                    tracker.spawn(async move {
                        if let Err(e) = handle_connection(stream, &state).await {
                            tracing::debug!("daemon connection error: {e}");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("daemon accept error: {e}");
                }
            },
        }
    }

    // Closing the listener refuses anything not yet accepted.
    drop(listener);
    tracker.close();
    tracing::info!(in_flight = tracker.len(), "draining daemon connections");
    tracker.wait().await;

    release_endpoint(&path, identity).await;
    tracing::info!(
        requests_served = state.served.load(Ordering::Relaxed),
        "llama daemon stopped"
    );
}

async fn release_endpoint(path: &Path, identity: SocketIdentity) {
    let _lock = match EndpointLock::acquire(path).await {
        Ok(lock) => lock,
        Err(e) => {
            tracing::warn!("not removing endpoint: {e}");
            return;
        }
    };
    match SocketIdentity::of(path) {
        Ok(current) if current == identity => {
            if let Err(e) = remove_if_exists(path).await {
                tracing::warn!(path = %path.display(), "removing endpoint: {e}");
            }
        }
        Ok(_) => {
            tracing::debug!(path = %path.display(), "endpoint rebound by another daemon; leaving it");
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), "checking endpoint: {e}");
        }
    }
}

/// Serve one connection.
///
/// A connection is in flight while a request is arriving: a fresh connection
/// before its first request, or any connection with bytes of its next
/// request already received. In-flight connections are waited on through
/// cancellation, each request bounded by [`REQUEST_TIMEOUT`]. A connection
/// with nothing pending between requests is idle and closes as soon as
/// cancellation starts.
async fn handle_connection(stream: UnixStream, state: &ServerState) -> io::Result<()> {
    let _active = ActiveGuard::enter(&state.active);
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut answered = false;

    loop {
        if answered && reader.buffer().is_empty() {
            let eof = tokio::select! {
                biased;
                filled = reader.fill_buf() => filled?.is_empty(),
                _ = state.cancel.cancelled() => return Ok(()),
            };
            if eof {
                return Ok(());
            }
        }

        line.clear();
        let read = read_request_line(&mut reader, &mut line);
        let outcome = match tokio::time::timeout(REQUEST_TIMEOUT, read).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                tracing::debug!("daemon connection request did not arrive in time");
                return Ok(());
            }
        };

        let response = match outcome {
            LineRead::Eof => return Ok(()),
            LineRead::TooLong => {
                // The rest of the line is still unread; there is no next
                // request boundary to resume from.
                let response =
                    Response::error(format!("request line exceeds {MAX_REQUEST_LINE} bytes"));
                write_response(&mut writer, &response).await?;
                return Ok(());
            }
            LineRead::Line => {
                let request = line.trim_ascii();
                if request.is_empty() {
                    continue;
                }
                match serde_json::from_slice::<Request>(request) {
                    Ok(request) => {
                        tracing::debug!(?request, "daemon request");
                        state.handle(request)
                    }
                    Err(e) => Response::error(format!("invalid request: {e}")),
                }
            }
        };

        write_response(&mut writer, &response).await?;
        answered = true;
    }
}

enum LineRead {
    Eof,
    Line,
    TooLong,
}

/// Read one request line into `buf`, reading at most [`MAX_REQUEST_LINE`]
/// bytes plus the newline.
async fn read_request_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_REQUEST_LINE as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        Ok(LineRead::Eof)
    } else if buf.last() != Some(&b'\n') && buf.len() > MAX_REQUEST_LINE {
        Ok(LineRead::TooLong)
    } else {
        Ok(LineRead::Line)
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(response)
        .unwrap_or_else(|_| r#"{"result":"error","message":"encoding failed"}"#.to_string());
    json.push('\n');
    writer.write_all(json.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DaemonClient;

    #[tokio::test]
    async fn test_ping_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llama.sock");
        let handle = start(&path).await.unwrap();

        let mut client = DaemonClient::dial(&path).await.unwrap();
        assert_eq!(client.ping().await.unwrap(), std::process::id());
        let status = client.status().await.unwrap();
        assert_eq!(status.version, VERSION);
        assert_eq!(status.requests_served, 2);
        assert_eq!(status.active_connections, 1);

        drop(client);
        handle.shutdown().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_malformed_line_keeps_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llama.sock");
        let handle = start(&path).await.unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"not json\n{\"method\":\"ping\"}\n").await.unwrap();

        let mut reader = BufReader::new(&mut stream);
        let mut first = String::new();
        reader.read_line(&mut first).await.unwrap();
        let first: Response = serde_json::from_str(&first).unwrap();
        assert!(matches!(first, Response::Error { .. }));

        let mut second = String::new();
        reader.read_line(&mut second).await.unwrap();
        let second: Response = serde_json::from_str(&second).unwrap();
        assert!(matches!(second, Response::Pong { .. }));

        drop(reader);
        drop(stream);
        handle.shutdown().await.unwrap();
    }

    async fn read_response<R: AsyncBufRead + Unpin>(reader: &mut R) -> Response {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llama.sock");
        let handle = start(&path).await.unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"\xff\xfe\n{\"method\":\"ping\"}\n").await.unwrap();

        let mut reader = BufReader::new(&mut stream);
        let first = read_response(&mut reader).await;
        assert!(matches!(first, Response::Error { ref message } if message.starts_with("invalid request")));
        assert!(matches!(read_response(&mut reader).await, Response::Pong { .. }));

        drop(reader);
        drop(stream);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_overlong_line_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llama.sock");
        let handle = start(&path).await.unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let mut request = vec![b' '; MAX_REQUEST_LINE + 16];
        request.push(b'\n');
        stream.write_all(&request).await.unwrap();

        let mut reader = BufReader::new(&mut stream);
        let reply = read_response(&mut reader).await;
        assert!(matches!(reply, Response::Error { ref message } if message.contains("exceeds")));

        // The connection is closed after the rejection.
        let mut rest = String::new();
        let after = reader.read_line(&mut rest).await;
        assert!(!matches!(after, Ok(n) if n > 0), "{rest:?}");

        drop(reader);
        drop(stream);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_line_at_limit_is_read() {
        let mut line = vec![b' '; MAX_REQUEST_LINE - 16];
        line.extend_from_slice(b"{\"method\":\"ping\"}\n");
        let mut input = &line[..];
        let mut buf = Vec::new();
        let outcome = read_request_line(&mut input, &mut buf).await.unwrap();
        assert!(matches!(outcome, LineRead::Line));
        assert!(matches!(
            serde_json::from_slice::<Request>(buf.trim_ascii()).unwrap(),
            Request::Ping
        ));
    }

    #[tokio::test]
    async fn test_shutdown_request_stops_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llama.sock");
        let handle = start(&path).await.unwrap();

        DaemonClient::dial(&path).await.unwrap().shutdown().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_idle_connection_closed_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llama.sock");
        let handle = start(&path).await.unwrap();

        let mut client = DaemonClient::dial(&path).await.unwrap();
        client.ping().await.unwrap();

        handle.shutdown().await.unwrap();

        // Server side is gone; the next call cannot get a reply.
        assert!(client.ping().await.is_err());
    }
}
