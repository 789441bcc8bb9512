//! Store selection for CLI commands.
//!
//! Precedence: explicit flag or `SPIDERQ_*` environment variable, then the
//! `--config` TOML file, then `StoreConfig` defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use spiderq_store::{DbType, StoreConfig};

#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// TOML file with `db_*` settings
    #[arg(long, global = true, env = "SPIDERQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend: sqlite or postgres
    #[arg(long, global = true, env = "SPIDERQ_DB_TYPE")]
    pub db_type: Option<DbType>,

    /// Directory holding per-project SQLite files
    #[arg(long, global = true, env = "SPIDERQ_DBS_DIR")]
    pub dbs_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "SPIDERQ_DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, global = true, env = "SPIDERQ_DB_PORT")]
    pub db_port: Option<u16>,

    #[arg(long, global = true, env = "SPIDERQ_DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, global = true, env = "SPIDERQ_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    #[arg(long, global = true, env = "SPIDERQ_DB_DATABASE")]
    pub db_database: Option<String>,

    /// Connection pool size
    #[arg(long, global = true, env = "SPIDERQ_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,
}

impl StoreArgs {
    /// Merge flags over the config file (if any) over defaults.
    pub fn resolve(&self) -> Result<StoreConfig> {
        let mut config = match &self.config {
            Some(path) => StoreConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => StoreConfig::default(),
        };

        if let Some(db_type) = self.db_type {
            config.db_type = db_type;
        }
        if let Some(dir) = &self.dbs_dir {
            config.dbs_dir = dir.clone();
        }
        if let Some(host) = &self.db_host {
            config.db_host = host.clone();
        }
        if let Some(port) = self.db_port {
            config.db_port = port;
        }
        if let Some(user) = &self.db_user {
            config.db_user = user.clone();
        }
        if let Some(password) = &self.db_password {
            config.db_password = password.clone();
        }
        if let Some(database) = &self.db_database {
            config.db_database = database.clone();
        }
        if self.max_connections.is_some() {
            config.max_connections = self.max_connections;
        }

        Ok(config)
    }
}
