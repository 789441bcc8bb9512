//! spiderq operator CLI
//!
//! Inspect and maintain the spider queues, key-value tables and finished-job
//! ledgers a scheduler keeps in SQLite files or PostgreSQL. Every command
//! prints JSON lines on stdout; logs go to `$SPIDERQ_HOME/logs` and stderr.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use spiderq_logging::{init_logging, LogConfig};
use tracing::error;

mod cli;

use cli::config::StoreArgs;

#[derive(Parser, Debug)]
#[command(name = "spiderq", version, about = "Inspect and maintain spiderq stores")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Per-project spider queues
    Queue {
        #[command(subcommand)]
        action: cli::queue::QueueAction,
    },
    /// JSON key-value tables
    Kv(cli::kv::KvArgs),
    /// Finished-job ledger
    Finished(cli::finished::FinishedArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "spiderq",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging unavailable: {e:#}");
            None
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.store.resolve()?;
    let mut out = io::stdout().lock();

    match cli.command {
        Commands::Queue { action } => cli::queue::run(action, &config, &mut out)?,
        Commands::Kv(args) => cli::kv::run(args, &config, &mut out)?,
        Commands::Finished(args) => cli::finished::run(args, &config, &mut out)?,
    }

    out.flush()?;
    Ok(())
}
