// flowgate-server/src/main.rs
// ============================================================================
// Module: Flowgate Server Entry Point
// Description: Command dispatcher for the `serve` and `store inspect`
//              subcommands (spec §9 wiring).
// Purpose: Thin binary: parse arguments, load configuration, and hand off to
//          the module that owns the relevant collaborators.
// Dependencies: clap, tokio, flowgate-config, flowgate-core, flowgate-store
// ============================================================================

//! Command dispatcher for the `serve` and `store inspect` subcommands.

mod audit;
mod inspect;
mod serve;

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use flowgate_config::FlowgateConfig;
use flowgate_core::execution::ExecutionStatus;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "flowgate-server", disable_help_subcommand = true, arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway and runtime worker, serving until signalled.
    Serve,
    /// Run store operator tools.
    Store {
        /// Selected store subcommand.
        #[command(subcommand)]
        command: StoreCommand,
    },
}

/// `store` subcommands.
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// List executions currently recorded with a given status, for operator
    /// inspection of executions a crashed worker left stranded.
    Inspect {
        /// Path to the sqlite database file (defaults to `DB_DSN`).
        #[arg(long, value_name = "PATH")]
        db_path: Option<PathBuf>,
        /// Execution status to filter on.
        #[arg(long, value_enum, default_value_t = StatusArg::Running)]
        status: StatusArg,
    },
}

/// CLI-facing mirror of [`ExecutionStatus`]; `clap::ValueEnum` cannot be
/// derived on a type defined in another crate.
#[derive(ValueEnum, Copy, Clone, Debug)]
enum StatusArg {
    /// Created, not yet dispatched.
    Pending,
    /// Traversal in progress.
    Running,
    /// Suspended at an approval/delay node awaiting resume.
    Paused,
    /// Traversal reached a terminal node without pausing.
    Completed,
    /// Traversal failed or was cancelled.
    Failed,
}

impl From<StatusArg> for ExecutionStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => Self::Pending,
            StatusArg::Running => Self::Running,
            StatusArg::Paused => Self::Paused,
            StatusArg::Completed => Self::Completed,
            StatusArg::Failed => Self::Failed,
        }
    }
}

/// CLI entry point returning an exit code (spec §6: `0` clean shutdown, `1`
/// fatal config error or bind failure).
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => command_serve().await,
        Commands::Store { command: StoreCommand::Inspect { db_path, status } } => command_store_inspect(db_path, status),
    }
}

/// Executes the `serve` command, shutting down gracefully on `SIGINT`/`SIGTERM`.
async fn command_serve() -> ExitCode {
    match serve::serve(shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

/// Writes a single error line to stderr.
fn report_error(err: &impl std::fmt::Display) {
    let _ = writeln!(std::io::stderr(), "flowgate-server: {err}");
}

/// Resolves when either `SIGINT` (Ctrl-C) or, on Unix, `SIGTERM` is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            return;
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Executes `store inspect` against `db_path`, falling back to `DB_DSN`.
fn command_store_inspect(db_path: Option<PathBuf>, status: StatusArg) -> ExitCode {
    let resolved = match db_path {
        Some(path) => path,
        None => match FlowgateConfig::load() {
            Ok(config) => config.db_path,
            Err(err) => {
                report_error(&err);
                return ExitCode::FAILURE;
            }
        },
    };
    match inspect::inspect(&resolved, status.into()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}
