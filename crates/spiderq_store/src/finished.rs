//! Finished-job ledger.
//!
//! Append-only history of completed crawl jobs. Rows are never updated; the
//! only deletion is [`FinishedJobs::trim`], which drops the oldest `end_time`
//! first to cap the table size.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DbType;
use crate::error::{Result, SqlContext};
use crate::pool::{with_pool, DbPool};
use crate::sql_guard::validate_table_name;

pub const DEFAULT_TABLE: &str = "finished_jobs";

/// A completed job, as reported by the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedJob {
    pub project: String,
    pub spider: String,
    /// Job identifier
    pub job: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// A stored ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FinishedJobRecord {
    pub id: i64,
    pub project: String,
    pub spider: String,
    pub job: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<FinishedJobRecord> for FinishedJob {
    fn from(record: FinishedJobRecord) -> Self {
        Self {
            project: record.project,
            spider: record.spider,
            job: record.job,
            start_time: record.start_time,
            end_time: record.end_time,
        }
    }
}

/// Ledger over one table.
#[derive(Debug, Clone)]
pub struct FinishedJobs {
    pool: DbPool,
    table: String,
}

impl FinishedJobs {
    pub async fn open(pool: DbPool, table: &str) -> Result<Self> {
        let table = validate_table_name(table)?.to_string();
        let ddl = match pool.db_type() {
            DbType::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {table} (id INTEGER PRIMARY KEY AUTOINCREMENT, \
                 project TEXT NOT NULL, spider TEXT NOT NULL, job TEXT NOT NULL, \
                 start_time TIMESTAMP NOT NULL, end_time TIMESTAMP NOT NULL)"
            ),
            DbType::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {table} (id BIGSERIAL PRIMARY KEY, \
                 project TEXT NOT NULL, spider TEXT NOT NULL, job TEXT NOT NULL, \
                 start_time TIMESTAMPTZ NOT NULL, end_time TIMESTAMPTZ NOT NULL)"
            ),
        };
        pool.ensure_schema(&table, &[ddl]).await?;

        info!(table = %table, backend = %pool.db_type(), "Finished-job ledger opened");
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Append a record.
    pub async fn add(&self, job: &FinishedJob) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (project, spider, job, start_time, end_time) VALUES ($1, $2, $3, $4, $5)",
            self.table
        );
        with_pool!(&self.pool, p => {
            sqlx::query(&sql)
                .bind(&job.project)
                .bind(&job.spider)
                .bind(&job.job)
                .bind(job.start_time)
                .bind(job.end_time)
                .execute(p)
                .await
                .map(|_| ())
        })
        .during("add", &self.table)
    }

    /// Keep only the `keep` most recent records (by `end_time`).
    ///
    /// `None` or `Some(0)` means unlimited retention and deletes nothing.
    /// Selection and deletion run as one statement, so concurrent trims to the
    /// same `keep` converge instead of over-deleting. Returns the number of
    /// rows removed.
    pub async fn trim(&self, keep: Option<u64>) -> Result<u64> {
        let keep = match keep {
            Some(keep) if keep > 0 => i64::try_from(keep).unwrap_or(i64::MAX),
            _ => return Ok(0),
        };
        let sql = format!(
            "DELETE FROM {t} WHERE id IN (\
                SELECT id FROM {t} ORDER BY end_time ASC, id ASC \
                LIMIT (SELECT CASE WHEN COUNT(*) > $1 THEN COUNT(*) - $1 ELSE 0 END FROM {t}))",
            t = self.table
        );
        let removed = with_pool!(&self.pool, p => {
            sqlx::query(&sql)
                .bind(keep)
                .execute(p)
                .await
                .map(|r| r.rows_affected())
        })
        .during("trim", &self.table)?;

        if removed > 0 {
            debug!(table = %self.table, removed, keep, "Trimmed finished jobs");
        }
        Ok(removed)
    }

    /// Delete every record.
    pub async fn clear(&self) -> Result<u64> {
        let sql = format!("DELETE FROM {}", self.table);
        with_pool!(&self.pool, p => sqlx::query(&sql).execute(p).await.map(|r| r.rows_affected()))
            .during("clear", &self.table)
    }

    pub async fn len(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = with_pool!(&self.pool, p => sqlx::query_scalar(&sql).fetch_one(p).await)
            .during("len", &self.table)?;
        Ok(count.max(0) as u64)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// All records, most recently finished first.
    pub async fn list(&self) -> Result<Vec<FinishedJobRecord>> {
        let sql = format!(
            "SELECT id, project, spider, job, start_time, end_time FROM {} \
             ORDER BY end_time DESC, id DESC",
            self.table
        );
        with_pool!(&self.pool, p => sqlx::query_as(&sql).fetch_all(p).await)
            .during("list", &self.table)
    }
}
