//! Invocation orchestration.
//!
//! One run is linear: buffer stdin, prepare attachments, encode arguments,
//! dispatch, then reconcile outputs and copy the remote streams back. Nothing
//! before dispatch has side effects on the backend, and nothing after it can
//! change the exit status.

use std::io;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use llama_protocol::{Blob, InvocationResponse, InvocationSpec, InvokeRequest, SpecError};
use llama_store::{SharedStore, StoreError};

use crate::argspec::{ArgSpecError, OutputMap, encode_args};
use crate::backend::{RemoteError, SharedBackend};
use crate::constants::{LOGS_BEGIN, LOGS_END, OUTPUT_FILE_MODE};
use crate::files::{FileSpec, FileSpecError, prepare_files, validate_files};

/// Fatal invocation failure.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("reading stdin: {0}")]
    Stdin(#[source] io::Error),

    #[error("writing stdin to store: {0}")]
    StdinStore(#[source] StoreError),

    #[error(transparent)]
    Files(#[from] FileSpecError),

    #[error(transparent)]
    Args(#[from] ArgSpecError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    /// The backend failed. Any logs it carried were already written out.
    #[error("invoke: {0}")]
    Remote(#[from] RemoteError),
}

/// What to run and how.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub function: String,
    /// Raw argument tokens, see [`crate::argspec`].
    pub args: Vec<String>,
    pub files: Vec<FileSpec>,
    /// Buffer standard input and send it along.
    pub stdin: bool,
    /// Ask for execution logs and show them.
    pub logs: bool,
}

/// Per-output outcome of reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub written: Vec<String>,
    /// Names the backend returned that were never requested.
    pub unexpected: Vec<String>,
    /// Names whose fetch or write failed.
    pub failed: Vec<String>,
}

/// Write execution logs between the log markers.
pub async fn write_logs<W>(w: &mut W, logs: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(logs.len() + LOGS_BEGIN.len() + LOGS_END.len() + 3);
    buf.extend_from_slice(LOGS_BEGIN.as_bytes());
    buf.push(b'\n');
    buf.extend_from_slice(logs);
    buf.push(b'\n');
    buf.extend_from_slice(LOGS_END.as_bytes());
    buf.push(b'\n');
    w.write_all(&buf).await?;
    w.flush().await
}

async fn show_logs<W>(w: &mut W, logs: &[u8])
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = write_logs(w, logs).await {
        tracing::warn!("writing invocation logs: {e}");
    }
}

/// Runs invocations against one store and one backend.
#[derive(Clone)]
pub struct Invoker {
    store: SharedStore,
    backend: SharedBackend,
}

impl Invoker {
    pub fn new(store: SharedStore, backend: SharedBackend) -> Self {
        Self { store, backend }
    }

    /// Build the invocation for `opts` without dispatching it.
    pub async fn prepare<R>(
        &self,
        opts: &InvokeOptions,
        mut stdin: R,
    ) -> Result<(InvocationSpec, OutputMap), InvokeError>
    where
        R: AsyncRead + Unpin,
    {
        // Nothing is uploaded until every destination is known to be valid.
        validate_files(&opts.files)?;
        let mut spec = InvocationSpec::new();

        if opts.stdin {
            let mut data = Vec::new();
            stdin
                .read_to_end(&mut data)
                .await
                .map_err(InvokeError::Stdin)?;
            let blob = self.store.put(&data).await.map_err(InvokeError::StdinStore)?;
            tracing::debug!(address = %blob.address.short(), size = blob.size, "stdin stored");
            spec.stdin = Some(blob);
        }

        for (dest, file) in prepare_files(self.store.as_ref(), &opts.files).await? {
            spec.attach(dest, file)?;
        }

        let (args, outputs) = encode_args(self.store.as_ref(), &opts.args).await?;
        spec.args = args;

        Ok((spec, outputs))
    }

    /// Run one invocation and return the remote exit status.
    ///
    /// Remote streams are copied to `stdout` and `stderr`; logs go to
    /// `stderr` between markers.
    pub async fn run<R, O, E>(
        &self,
        opts: &InvokeOptions,
        stdin: R,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<i32, InvokeError>
    where
        R: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let (spec, outputs) = self.prepare(opts, stdin).await?;
        let request = InvokeRequest {
            function: opts.function.clone(),
            spec,
            return_logs: opts.logs,
        };

        tracing::info!(
            function = %request.function,
            args = request.spec.args.len(),
            files = request.spec.files().len(),
            "dispatching invocation"
        );

        let response = match self.backend.invoke(&request).await {
            Ok(response) => response,
            Err(err) => {
                if let Some(logs) = &err.logs {
                    show_logs(stderr, logs).await;
                }
                return Err(err.into());
            }
        };

        if opts.logs
            && let Some(logs) = &response.logs
        {
            show_logs(stderr, logs).await;
        }

        let report = self.reconcile_outputs(&outputs, &response).await;
        tracing::debug!(
            written = report.written.len(),
            unexpected = report.unexpected.len(),
            failed = report.failed.len(),
            "outputs reconciled"
        );

        self.copy_stream(response.stderr.as_ref(), stderr, "stderr").await;
        self.copy_stream(response.stdout.as_ref(), stdout, "stdout").await;

        Ok(response.exit_status)
    }

    /// Write every returned output to its registered destination.
    ///
    /// Failures are logged per output and never stop the rest.
    pub async fn reconcile_outputs(
        &self,
        outputs: &OutputMap,
        response: &InvocationResponse,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for (name, blob) in &response.outputs {
            let Some(dest) = outputs.get(name) else {
                tracing::warn!(output = %name, "unexpected output");
                report.unexpected.push(name.clone());
                continue;
            };
            match self.write_output(blob, dest).await {
                Ok(()) => {
                    tracing::debug!(output = %name, path = %dest.display(), "output written");
                    report.written.push(name.clone());
                }
                Err(e) => {
                    tracing::warn!(output = %name, path = %dest.display(), "writing output: {e}");
                    report.failed.push(name.clone());
                }
            }
        }
        report
    }

    async fn write_output(&self, blob: &Blob, dest: &Path) -> Result<(), StoreError> {
        let data = self.store.get(blob).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(OUTPUT_FILE_MODE)
            .open(dest)
            .await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn copy_stream<W>(&self, blob: Option<&Blob>, w: &mut W, stream: &str)
    where
        W: AsyncWrite + Unpin,
    {
        let Some(blob) = blob else {
            return;
        };
        let data = match self.store.get(blob).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(stream, "fetching remote {stream}: {e}");
                return;
            }
        };
        if let Err(e) = w.write_all(&data).await {
            tracing::warn!(stream, "writing remote {stream}: {e}");
            return;
        }
        if let Err(e) = w.flush().await {
            tracing::warn!(stream, "flushing remote {stream}: {e}");
        }
    }
}
