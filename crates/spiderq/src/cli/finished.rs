//! `spiderq finished` - finished-job ledger maintenance

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;
use spiderq_store::{finished, DbPool, FinishedJobs, StoreConfig};
use tracing::info;

use crate::cli::output::emit;
use crate::cli::{runtime, DEFAULT_DB_NAME};

#[derive(Args, Debug, Clone)]
pub struct FinishedArgs {
    #[arg(long, global = true, default_value = finished::DEFAULT_TABLE)]
    pub table: String,

    /// SQLite file stem under the dbs directory (ignored for PostgreSQL)
    #[arg(long, global = true, default_value = DEFAULT_DB_NAME)]
    pub db: String,

    #[command(subcommand)]
    pub action: FinishedAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FinishedAction {
    /// Finished jobs, most recent first
    List,
    /// Number of recorded jobs
    Count,
    /// Keep only the N most recently finished jobs
    Trim {
        #[arg(long)]
        keep: u64,
    },
}

pub fn run<W: Write + ?Sized>(args: FinishedArgs, config: &StoreConfig, out: &mut W) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let pool = DbPool::connect(config, &args.db).await?;
        let ledger = FinishedJobs::open(pool.clone(), &args.table).await?;

        let result = match args.action {
            FinishedAction::List => {
                for record in ledger.list().await? {
                    emit(out, &record)?;
                }
                Ok(())
            }
            FinishedAction::Count => {
                let count = ledger.len().await?;
                emit(out, &json!({ "count": count }))
            }
            FinishedAction::Trim { keep } => {
                let removed = ledger.trim(Some(keep)).await?;
                info!(table = %args.table, keep, removed, "trimmed finished jobs");
                emit(out, &json!({ "kept": keep, "removed": removed }))
            }
        };

        pool.close().await;
        result
    })
}
