//! Subcommands of the `spiderq` binary.
//!
//! Each command module exposes an action type parsed by clap and a `run`
//! that opens the store it needs, performs the action and writes JSON lines
//! to the given writer.

pub mod config;
pub mod finished;
pub mod kv;
pub mod output;
pub mod queue;

/// SQLite file stem used by `kv` and `finished` when `--db` is not given.
pub const DEFAULT_DB_NAME: &str = "spiderq";

/// Build the single-threaded runtime commands run on.
pub(crate) fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
