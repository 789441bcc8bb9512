//! Persistent JSON priority queue.
//!
//! Several processes may pop from the same table at once. Dequeue is
//! optimistic: read the head row, delete it by id inside a transaction, and
//! check the affected row count. Zero rows means another connection consumed
//! the entry first; the transaction is rolled back and the whole read/delete
//! is retried. Each entry is therefore delivered at most once without holding
//! locks between the read and the write.
//!
//! Only that race is retried. Any error from the database itself propagates.
//!
//! Entries are served by `(priority DESC, id ASC)`: highest priority first,
//! FIFO among equal priorities.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::codec::{decode_from, encode};
use crate::config::DbType;
use crate::error::{DbError, Result, SqlContext};
use crate::pool::{with_pool, DbPool};
use crate::sql_guard::{index_name, validate_table_name};

pub const DEFAULT_TABLE: &str = "queue";

/// Outcome of one read/delete round.
enum Claim {
    Empty,
    Won(Value),
    Lost(i64),
}

/// Priority queue over one table.
#[derive(Debug, Clone)]
pub struct JsonPriorityQueue {
    pool: DbPool,
    table: String,
}

impl JsonPriorityQueue {
    /// Open the queue, creating its table and ordering index if needed.
    pub async fn open(pool: DbPool, table: &str) -> Result<Self> {
        let table = validate_table_name(table)?.to_string();
        pool.ensure_schema(&table, &schema(pool.db_type(), &table)).await?;

        info!(table = %table, backend = %pool.db_type(), "Priority queue opened");
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Enqueue `message` with `priority`. Higher priorities pop first.
    ///
    /// A non-finite priority is rejected with [`DbError::InvalidPriority`]
    /// before anything is written.
    pub async fn put<T: Serialize + ?Sized>(&self, message: &T, priority: f64) -> Result<()> {
        if !priority.is_finite() {
            return Err(DbError::InvalidPriority(priority));
        }
        let sql = format!(
            "INSERT INTO {} (priority, message) VALUES ($1, $2)",
            self.table
        );
        let text = encode(message)?;
        with_pool!(&self.pool, p => {
            sqlx::query(&sql)
                .bind(priority)
                .bind(&text)
                .execute(p)
                .await
                .map(|_| ())
        })
        .during("put", &self.table)
    }

    /// Remove and return the highest-priority message, `None` when empty.
    pub async fn pop(&self) -> Result<Option<Value>> {
        let mut attempt: u32 = 0;
        loop {
            match self.claim_head().await? {
                Claim::Empty => return Ok(None),
                Claim::Won(message) => return Ok(Some(message)),
                Claim::Lost(id) => {
                    attempt += 1;
                    debug!(table = %self.table, id, attempt, "Queue entry taken by another consumer, retrying pop");
                }
            }
        }
    }

    async fn claim_head(&self) -> Result<Claim> {
        let select = format!(
            "SELECT id, message FROM {} ORDER BY priority DESC, id ASC LIMIT 1",
            self.table
        );
        let delete = format!("DELETE FROM {} WHERE id = $1", self.table);

        let head: Option<(i64, String)> =
            with_pool!(&self.pool, p => sqlx::query_as(&select).fetch_optional(p).await)
                .during("pop", &self.table)?;
        let Some((id, text)) = head else {
            return Ok(Claim::Empty);
        };

        // Decode before deleting so a corrupt payload stays in place for inspection.
        let message: Value = decode_from(&self.table, &text)?;

        let won = with_pool!(&self.pool, p => {
            let mut tx = p.begin().await.during("pop", &self.table)?;
            let affected = sqlx::query(&delete)
                .bind(id)
                .execute(&mut *tx)
                .await
                .during("pop", &self.table)?
                .rows_affected();
            if affected == 0 {
                tx.rollback().await.during("pop", &self.table)?;
                false
            } else {
                tx.commit().await.during("pop", &self.table)?;
                true
            }
        });

        Ok(if won { Claim::Won(message) } else { Claim::Lost(id) })
    }

    /// Delete every entry whose message satisfies `predicate`; returns how
    /// many were deleted.
    ///
    /// Matching rows are deleted one by one in a single transaction. If any
    /// of them has already been consumed elsewhere, the transaction is rolled
    /// back and the scan starts over, so the count never includes an entry
    /// this call did not delete.
    pub async fn remove<F>(&self, mut predicate: F) -> Result<u64>
    where
        F: FnMut(&Value) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            if let Some(removed) = self.remove_matching(&mut predicate).await? {
                return Ok(removed);
            }
            attempt += 1;
            debug!(table = %self.table, attempt, "Queue entry vanished during remove, rescanning");
        }
    }

    async fn remove_matching<F>(&self, predicate: &mut F) -> Result<Option<u64>>
    where
        F: FnMut(&Value) -> bool,
    {
        let select = format!("SELECT id, message FROM {} ORDER BY id", self.table);
        let delete = format!("DELETE FROM {} WHERE id = $1", self.table);

        let rows: Vec<(i64, String)> =
            with_pool!(&self.pool, p => sqlx::query_as(&select).fetch_all(p).await)
                .during("remove", &self.table)?;

        let mut doomed = Vec::new();
        for (id, text) in &rows {
            let message: Value = decode_from(&self.table, text)?;
            if predicate(&message) {
                doomed.push(*id);
            }
        }
        if doomed.is_empty() {
            return Ok(Some(0));
        }

        with_pool!(&self.pool, p => {
            let mut tx = p.begin().await.during("remove", &self.table)?;
            for id in &doomed {
                let affected = sqlx::query(&delete)
                    .bind(*id)
                    .execute(&mut *tx)
                    .await
                    .during("remove", &self.table)?
                    .rows_affected();
                if affected == 0 {
                    tx.rollback().await.during("remove", &self.table)?;
                    return Ok(None);
                }
            }
            tx.commit().await.during("remove", &self.table)?;
        });

        Ok(Some(doomed.len() as u64))
    }

    /// Delete every entry.
    pub async fn clear(&self) -> Result<()> {
        let sql = format!("DELETE FROM {}", self.table);
        with_pool!(&self.pool, p => sqlx::query(&sql).execute(p).await.map(|_| ()))
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

    /// Snapshot of `(message, priority)` pairs in pop order.
    pub async fn list(&self) -> Result<Vec<(Value, f64)>> {
        let sql = format!(
            "SELECT message, priority FROM {} ORDER BY priority DESC, id ASC",
            self.table
        );
        let rows: Vec<(String, f64)> =
            with_pool!(&self.pool, p => sqlx::query_as(&sql).fetch_all(p).await)
                .during("list", &self.table)?;
        rows.into_iter()
            .map(|(text, priority)| -> Result<(Value, f64)> {
                Ok((decode_from(&self.table, &text)?, priority))
            })
            .collect()
    }
}

/// DDL for the queue table and its pop-order index.
fn schema(db_type: DbType, table: &str) -> Vec<String> {
    let (schema_prefix, name) = match table.split_once('.') {
        Some((schema, name)) => (format!("{schema}."), name),
        None => (String::new(), table),
    };
    let index = index_name(name, "pop");
    match db_type {
        DbType::Sqlite => vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {table} \
                 (id INTEGER PRIMARY KEY AUTOINCREMENT, priority REAL NOT NULL DEFAULT 0, message TEXT NOT NULL)"
            ),
            // SQLite qualifies the index name, not the table
            format!(
                "CREATE INDEX IF NOT EXISTS {schema_prefix}{index} ON {name} (priority DESC, id ASC)"
            ),
        ],
        DbType::Postgres => vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {table} \
                 (id BIGSERIAL PRIMARY KEY, priority DOUBLE PRECISION NOT NULL DEFAULT 0, message TEXT NOT NULL)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {index} ON {table} (priority DESC, id ASC)"
            ),
        ],
    }
}
