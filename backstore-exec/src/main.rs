use backstore::exec::Verb;
use backstore_config::shared::SnapshotAccessConfig;
use backstore_telemetry::{LogFlusher, init_file_tracing};
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::error;

use crate::config::load_access_config;
use crate::core::{ExecRequest, handle_request};

mod config;
mod core;

/// Directory under the system temporary directory receiving log files.
const LOG_DIR_NAME: &str = "backstore-exec-logs";

/// Serves snapshot requests from inside the pod that mounts a repository.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the repository's snapshots as a JSON array
    Snapshots(RequestArgs),
    /// Forget the given snapshots of the repository
    Forget(RequestArgs),
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    /// Name of the Repository resource
    #[arg(long)]
    repo_name: String,

    /// Namespace of the Repository resource
    #[arg(long)]
    repo_namespace: String,

    /// Snapshot IDs or ID prefixes; none selects every snapshot when listing
    snapshot_ids: Vec<String>,
}

impl From<Command> for ExecRequest {
    fn from(command: Command) -> Self {
        let (verb, args) = match command {
            Command::Snapshots(args) => (Verb::Snapshots, args),
            Command::Forget(args) => (Verb::Forget, args),
        };

        ExecRequest {
            verb,
            repo_name: args.repo_name,
            repo_namespace: args.repo_namespace,
            snapshot_ids: args.snapshot_ids,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_access_config()?;

    let _log_flusher = init_exec_tracing(&std::env::temp_dir().join(LOG_DIR_NAME));

    // Requests are served one at a time, a single worker is enough.
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?
        .block_on(async_main(config, args.command.into()))?;

    Ok(())
}

/// Sets up file logging, returning `None` when the log directory is unusable.
///
/// Stdout carries the response and a terminal session merges stderr into it, so
/// logs never go to either stream and the request is served without logs
/// rather than not at all.
fn init_exec_tracing(log_dir: &Path) -> Option<LogFlusher> {
    init_file_tracing(env!("CARGO_BIN_NAME"), log_dir).ok()
}

async fn async_main(config: SnapshotAccessConfig, request: ExecRequest) -> anyhow::Result<()> {
    if let Err(err) = handle_request(config, request).await {
        error!("an error occurred while serving the snapshot request: {err}");

        return Err(err);
    }

    Ok(())
}
