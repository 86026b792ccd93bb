//! llama binary.
//!
//! Usage:
//!   # Run a function remotely, shipping a file in and one back out
//!   llama invoke --executor ./run-remote convert i@in.png o@out.jpg
//!
//!   # Start the per-user daemon (exits 3 if one is already running)
//!   llama daemon
//!   llama daemon --ping
//!   llama daemon --stop

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use llama_client::{Config, FileSpec, InvokeOptions, Invoker};
use llama_daemon::{DaemonClient, DaemonError};

/// Exit status when `llama daemon` finds another daemon on the endpoint.
const EXIT_ALREADY_RUNNING: u8 = 3;

/// Remote function invocation with content-addressed file transfer.
#[derive(Parser, Debug)]
#[command(name = "llama", version)]
struct Cli {
    /// Blob store directory (default: $LLAMA_STORE, then the user data dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Daemon socket (default: $LLAMA_SOCKET, then ~/.llama/llama.sock)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke a remote function
    Invoke(InvokeArgs),
    /// Run or query the per-user daemon
    Daemon(DaemonArgs),
}

impl Command {
    fn default_filter(&self) -> &'static str {
        match self {
            Command::Invoke(_) => "warn",
            Command::Daemon(_) => "info",
        }
    }
}

#[derive(Args, Debug)]
struct InvokeArgs {
    /// Send standard input to the function
    #[arg(long)]
    stdin: bool,

    /// Request and print execution logs
    #[arg(long)]
    logs: bool,

    /// Attach a file as SRC[:DEST]; DEST must be relative
    #[arg(short = 'f', long = "file", value_name = "SRC[:DEST]")]
    files: Vec<FileSpec>,

    /// Executor program (default: $LLAMA_EXECUTOR)
    #[arg(long)]
    executor: Option<String>,

    /// Function to invoke
    function: String,

    /// Arguments: plain, raw@STR, i@PATH, o@PATH, io@PATH
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
struct DaemonArgs {
    /// Check whether a daemon is answering
    #[arg(long)]
    ping: bool,

    /// Print the running daemon's status as JSON
    #[arg(long)]
    status: bool,

    /// Ask the running daemon to shut down
    #[arg(long)]
    stop: bool,
}

fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.command.default_filter());

    let result = match cli.command {
        Command::Invoke(args) => invoke(cli.store, args).await,
        Command::Daemon(args) => daemon(cli.socket, args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("llama: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Exit with the remote status. Anything a process cannot exit with, such as
/// the negative status of a killed command, becomes 255.
fn exit_status(status: i32) -> ExitCode {
    match u8::try_from(status) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::from(u8::MAX),
    }
}

async fn invoke(store: Option<PathBuf>, args: InvokeArgs) -> Result<ExitCode> {
    let config = Config::resolve(store, args.executor);
    let store = llama_store::open_store(&config.store_dir)
        .await
        .with_context(|| format!("opening store {}", config.store_dir.display()))?;
    let backend = Arc::new(config.backend()?);
    let invoker = Invoker::new(store, backend);

    let opts = InvokeOptions {
        function: args.function,
        args: args.args,
        files: args.files,
        stdin: args.stdin,
        logs: args.logs,
    };

    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let status = invoker
        .run(&opts, tokio::io::stdin(), &mut stdout, &mut stderr)
        .await?;
    tracing::debug!(status, "invocation finished");
    Ok(exit_status(status))
}

async fn daemon(socket: Option<PathBuf>, args: DaemonArgs) -> Result<ExitCode> {
    let path = socket.unwrap_or_else(llama_daemon::socket_path);

    if args.ping || args.status || args.stop {
        let mut client = DaemonClient::dial(&path).await?;
        if args.ping {
            let pid = client.ping().await?;
            println!("pong from pid {pid} at {}", path.display());
        } else if args.status {
            let report = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            client.shutdown().await?;
            println!("shutdown requested");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));
    match llama_daemon::run(&path, cancel).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(DaemonError::AlreadyRunning(path)) => {
            eprintln!("llama: daemon already running at {}", path.display());
            Ok(ExitCode::from(EXIT_ALREADY_RUNNING))
        }
        Err(e) => Err(e.into()),
    }
}

/// Cancel on SIGINT or SIGTERM, or return quietly once cancelled elsewhere.
async fn cancel_on_signal(cancel: CancellationToken) {
    let mut term =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM: {e}");
                return;
            }
        };
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
        _ = term.recv() => tracing::info!("terminated"),
    }
    cancel.cancel();
}
