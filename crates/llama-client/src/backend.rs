//! Backends: where an invocation actually runs.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use llama_protocol::{InvocationResponse, InvokeReply, InvokeRequest};

/// A failed remote call.
///
/// Failures may still carry the execution logs captured up to the point of
/// failure; callers show them before giving up.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    pub logs: Option<Vec<u8>>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            logs: None,
        }
    }

    pub fn with_logs(mut self, logs: impl Into<Vec<u8>>) -> Self {
        self.logs = Some(logs.into());
        self
    }
}

/// Remote function execution.
///
/// `invoke` blocks until the backend answers or its own timeout fires; there
/// are no retries at this layer.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvocationResponse, RemoteError>;
}

/// Backend handle shared between tasks.
pub type SharedBackend = Arc<dyn Backend>;

/// Runs an executor program per invocation.
///
/// The program is started as `<program> [args…] <FUNCTION>`, receives the
/// JSON [`InvokeRequest`] on stdin and must print one JSON [`InvokeReply`] on
/// stdout. Its stderr is kept as logs when the reply is missing or malformed.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before the function name.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

fn non_empty(bytes: Vec<u8>) -> Option<Vec<u8>> {
    if bytes.is_empty() { None } else { Some(bytes) }
}

#[async_trait]
impl Backend for CommandBackend {
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvocationResponse, RemoteError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| RemoteError::new(format!("encoding request: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&request.function)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RemoteError::new(format!(
                    "spawning executor {}: {e}",
                    self.program.display()
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RemoteError::new("executor stdin unavailable"))?;

        // Feed the request while draining output so a large spec cannot
        // deadlock against a full stdout pipe.
        let feed = async move {
            let result = stdin.write_all(&payload).await;
            drop(stdin);
            result
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output =
            output.map_err(|e| RemoteError::new(format!("waiting for executor: {e}")))?;
        if let Err(e) = fed {
            tracing::debug!(error = %e, "executor closed stdin early");
        }

        let reply: InvokeReply = match serde_json::from_slice(&output.stdout) {
            Ok(reply) => reply,
            Err(e) => {
                let err = RemoteError::new(format!(
                    "executor {} ({}) returned no valid reply: {e}",
                    self.program.display(),
                    output.status
                ));
                return Err(match non_empty(output.stderr) {
                    Some(stderr) => err.with_logs(stderr),
                    None => err,
                });
            }
        };

        match reply {
            InvokeReply::Success { mut response, logs } => {
                response.logs = logs.map(String::into_bytes);
                tracing::debug!(
                    function = %request.function,
                    exit_status = response.exit_status,
                    outputs = response.outputs.len(),
                    "invocation returned"
                );
                Ok(response)
            }
            InvokeReply::Failure { error, logs } => Err(RemoteError {
                message: error,
                logs: logs.map(String::into_bytes),
            }),
        }
    }
}
