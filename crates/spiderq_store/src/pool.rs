//! Database pool creation.
//!
//! Unlike `sqlx::AnyPool`, we keep concrete pool types and pick between them
//! with a closed enum at construction time. Store code is written once and
//! expanded per backend through [`with_pool!`], so each arm is type-checked
//! against its own driver.
//!
//! Every store operation acquires a connection (or transaction) from the pool
//! for its own scope only; no connection is held across calls.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::info;

use crate::config::{DbType, StoreConfig};
use crate::error::{DbError, Result};

/// How long a SQLite writer waits on another process's lock before failing.
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection pool for one of the supported backends.
#[derive(Debug, Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

/// Expand `$body` once per backend with `$p` bound to the concrete pool.
macro_rules! with_pool {
    ($pool:expr, $p:ident => $body:expr) => {
        match $pool {
            $crate::pool::DbPool::Sqlite($p) => $body,
            $crate::pool::DbPool::Postgres($p) => $body,
        }
    };
}
pub(crate) use with_pool;

impl DbPool {
    /// Open the pool the configuration selects for `project`.
    ///
    /// SQLite gets one file per project; PostgreSQL ignores `project` here
    /// (callers scope the table name instead).
    pub async fn connect(config: &StoreConfig, project: &str) -> Result<Self> {
        match config.db_type {
            DbType::Sqlite => {
                std::fs::create_dir_all(&config.dbs_dir)?;
                Self::sqlite_with(config.sqlite_path(project), config.pool_size()).await
            }
            DbType::Postgres => Self::postgres(&config.postgres_url(), config.pool_size()).await,
        }
    }

    /// Open or create a SQLite database file.
    pub async fn sqlite(path: impl AsRef<Path>) -> Result<Self> {
        Self::sqlite_with(path, 5).await
    }

    async fn sqlite_with(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            // WAL mode for better concurrent access
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(SQLITE_BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| DbError::database("connect", path.display().to_string(), e))?;

        info!(path = %path.display(), "Connected to sqlite database");
        Ok(Self::Sqlite(pool))
    }

    /// In-memory SQLite database (for testing).
    ///
    /// Pinned to a single connection that never expires: every connection to
    /// `:memory:` is a separate database.
    pub async fn sqlite_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::database("connect", ":memory:", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::database("connect", ":memory:", e))?;
        Ok(Self::Sqlite(pool))
    }

    /// Connect to PostgreSQL.
    pub async fn postgres(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| DbError::database("connect", "postgres", e))?;

        info!("Connected to postgres database");
        Ok(Self::Postgres(pool))
    }

    /// Wrap an existing PostgreSQL pool.
    pub fn from_pg(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    /// Wrap an existing SQLite pool.
    pub fn from_sqlite(pool: SqlitePool) -> Self {
        Self::Sqlite(pool)
    }

    pub fn db_type(&self) -> DbType {
        match self {
            DbPool::Sqlite(_) => DbType::Sqlite,
            DbPool::Postgres(_) => DbType::Postgres,
        }
    }

    /// Close every connection in the pool.
    pub async fn close(&self) {
        with_pool!(self, p => p.close().await)
    }

    /// Run `CREATE ... IF NOT EXISTS` statements.
    ///
    /// PostgreSQL can still report a duplicate when two processes create the
    /// same table at the same instant; that outcome is the desired end state,
    /// so it is treated as success.
    pub(crate) async fn ensure_schema(&self, table: &str, statements: &[String]) -> Result<()> {
        for sql in statements {
            let result = with_pool!(self, p => sqlx::query(sql).execute(p).await.map(|_| ()));
            match result {
                Ok(()) => {}
                Err(e) if is_duplicate_object(&e) => {}
                Err(e) => return Err(DbError::database("create table", table, e)),
            }
        }
        Ok(())
    }
}

fn is_duplicate_object(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    // unique_violation (pg_type race), duplicate_table, duplicate_object
    matches!(
        db_err.code().as_deref(),
        Some("23505") | Some("42P07") | Some("42710")
    )
}
