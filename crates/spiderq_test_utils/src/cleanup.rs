//! Test cleanup utilities for database isolation.

use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

/// RAII guard for PostgreSQL test isolation.
///
/// Creates a unique schema for each test and drops it on Drop. Stores under
/// test address their tables through [`PostgresTestGuard::qualified`], so no
/// connection-level `search_path` is needed. Tables a test cannot place in
/// the schema (per-project queue tables) are registered with
/// [`PostgresTestGuard::adopt_table`] and dropped alongside it.
///
/// # Example
///
/// ```rust,ignore
/// use spiderq_test_utils::{TestPgPool, PostgresTestGuard};
///
/// #[tokio::test]
/// async fn test_isolated() {
///     let pool = TestPgPool::new().await.unwrap();
///     let guard = PostgresTestGuard::new(pool.pool.clone()).await.unwrap();
///
///     let table = guard.qualified("queue"); // test_<uuid>.queue
///     // Schema is automatically dropped when guard goes out of scope
/// }
/// ```
pub struct PostgresTestGuard {
    pool: PgPool,
    schema_name: String,
    adopted: Vec<String>,
    dropped: bool,
}

impl PostgresTestGuard {
    /// Create a new test guard with a unique schema.
    ///
    /// The schema name is generated using a UUID to ensure uniqueness.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let schema_name = format!("test_{}", Uuid::new_v4().simple());

        debug!("Creating test schema: {}", schema_name);

        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            schema_name,
            adopted: Vec::new(),
            dropped: false,
        })
    }

    /// `schema.table` inside this guard's schema.
    pub fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.schema_name, table)
    }

    /// `prefix` made unique to this guard, for names that live outside the
    /// schema (project names, default-schema tables).
    pub fn unique_name(&self, prefix: &str) -> String {
        let suffix = self.schema_name.trim_start_matches("test_");
        format!("{prefix}_{suffix}")
    }

    /// Drop `table` (in the default schema) together with the test schema.
    pub fn adopt_table(&mut self, table: impl Into<String>) {
        self.adopted.push(table.into());
    }

    /// Get the schema name.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Drop the schema now, reporting failures.
    ///
    /// Drop does this as well, but can only log errors.
    pub async fn cleanup(mut self) -> Result<()> {
        debug!("Dropping test schema: {}", self.schema_name);

        for sql in drop_statements(&self.schema_name, &self.adopted) {
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        self.dropped = true;

        Ok(())
    }
}

impl Drop for PostgresTestGuard {
    fn drop(&mut self) {
        if self.dropped {
            return;
        }
        let pool = self.pool.clone();
        let schema_name = self.schema_name.clone();
        let statements = drop_statements(&self.schema_name, &self.adopted);

        // No async in Drop: hand the DROP SCHEMA to the current runtime if
        // there is one.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                for sql in statements {
                    if let Err(e) = sqlx::query(&sql).execute(&pool).await {
                        warn!("Cleanup of test schema {} failed at `{}`: {}", schema_name, sql, e);
                        return;
                    }
                }
                debug!("Dropped test schema: {}", schema_name);
            });
        } else {
            warn!(
                "Not in async context, cannot cleanup schema: {}",
                self.schema_name
            );
        }
    }
}

/// Adopted tables first, then the schema itself.
fn drop_statements(schema_name: &str, adopted: &[String]) -> Vec<String> {
    adopted
        .iter()
        .map(|table| format!("DROP TABLE IF EXISTS {table}"))
        .chain(std::iter::once(format!("DROP SCHEMA {schema_name} CASCADE")))
        .collect()
}
