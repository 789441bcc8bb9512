//! Persistent string-keyed JSON dictionary.
//!
//! One row per key. Keys and values are both stored JSON-encoded, so a key
//! `job-1` is the text `"job-1"` in the `key` column.

use serde_json::Value;
use tracing::info;

use crate::codec::{decode_from, encode};
use crate::error::{DbError, Result, SqlContext};
use crate::pool::{with_pool, DbPool};
use crate::sql_guard::validate_table_name;

pub const DEFAULT_TABLE: &str = "dict";

/// Key-value store over one table.
#[derive(Debug, Clone)]
pub struct JsonDict {
    pool: DbPool,
    table: String,
}

impl JsonDict {
    /// Open the store, creating its table if it does not exist.
    pub async fn open(pool: DbPool, table: &str) -> Result<Self> {
        let table = validate_table_name(table)?.to_string();
        let ddl = format!("CREATE TABLE IF NOT EXISTS {table} (key TEXT PRIMARY KEY, value TEXT)");
        pool.ensure_schema(&table, &[ddl]).await?;

        info!(table = %table, backend = %pool.db_type(), "Key-value store opened");
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Value for `key`, or [`DbError::KeyNotFound`].
    pub async fn get(&self, key: &str) -> Result<Value> {
        self.get_opt(key)
            .await?
            .ok_or_else(|| DbError::key_not_found(&self.table, key))
    }

    /// Value for `key`, `None` when absent.
    pub async fn get_opt(&self, key: &str) -> Result<Option<Value>> {
        let sql = format!("SELECT value FROM {} WHERE key = $1", self.table);
        let encoded_key = encode(key)?;
        let row: Option<(String,)> = with_pool!(&self.pool, p => {
            sqlx::query_as(&sql).bind(&encoded_key).fetch_optional(p).await
        })
        .during("get", &self.table)?;

        row.map(|(text,)| decode_from(&self.table, &text)).transpose()
    }

    pub async fn contains_key(&self, key: &str) -> Result<bool> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE key = $1", self.table);
        let encoded_key = encode(key)?;
        let count: i64 = with_pool!(&self.pool, p => {
            sqlx::query_scalar(&sql).bind(&encoded_key).fetch_one(p).await
        })
        .during("contains_key", &self.table)?;
        Ok(count > 0)
    }

    /// Insert or replace the value for `key`. Committed on return.
    pub async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            self.table
        );
        let (encoded_key, encoded_value) = (encode(key)?, encode(value)?);
        with_pool!(&self.pool, p => {
            sqlx::query(&sql)
                .bind(&encoded_key)
                .bind(&encoded_value)
                .execute(p)
                .await
                .map(|_| ())
        })
        .during("set", &self.table)
    }

    /// Remove `key`. Returns whether a row was deleted; a missing key is not
    /// an error.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE key = $1", self.table);
        let encoded_key = encode(key)?;
        let affected = with_pool!(&self.pool, p => {
            sqlx::query(&sql)
                .bind(&encoded_key)
                .execute(p)
                .await
                .map(|r| r.rows_affected())
        })
        .during("delete", &self.table)?;
        Ok(affected > 0)
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

    /// All keys, in storage order.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let sql = format!("SELECT key FROM {}", self.table);
        let rows: Vec<String> = with_pool!(&self.pool, p => sqlx::query_scalar(&sql).fetch_all(p).await)
            .during("keys", &self.table)?;
        rows.iter().map(|k| decode_from(&self.table, k)).collect()
    }

    /// All values, in storage order.
    pub async fn values(&self) -> Result<Vec<Value>> {
        let sql = format!("SELECT value FROM {}", self.table);
        let rows: Vec<String> = with_pool!(&self.pool, p => sqlx::query_scalar(&sql).fetch_all(p).await)
            .during("values", &self.table)?;
        rows.iter().map(|v| decode_from(&self.table, v)).collect()
    }

    /// All `(key, value)` pairs, in storage order.
    pub async fn items(&self) -> Result<Vec<(String, Value)>> {
        let sql = format!("SELECT key, value FROM {}", self.table);
        let rows: Vec<(String, String)> =
            with_pool!(&self.pool, p => sqlx::query_as(&sql).fetch_all(p).await)
                .during("items", &self.table)?;
        rows.iter()
            .map(|(k, v)| -> Result<(String, Value)> {
                Ok((decode_from(&self.table, k)?, decode_from(&self.table, v)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn dict() -> JsonDict {
        let pool = DbPool::sqlite_memory().await.unwrap();
        JsonDict::open(pool, DEFAULT_TABLE).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let d = dict().await;
        let err = d.get("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(d.get_opt("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_is_upsert() {
        let d = dict().await;
        d.set("job", &json!({"state": "pending"})).await.unwrap();
        d.set("job", &json!({"state": "running"})).await.unwrap();
        d.set("job", &json!({"state": "running"})).await.unwrap();

        assert_eq!(d.len().await.unwrap(), 1);
        assert_eq!(d.get("job").await.unwrap(), json!({"state": "running"}));
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let d = dict().await;
        d.set("a", &json!(1)).await.unwrap();
        assert!(d.delete("a").await.unwrap());
        assert!(!d.delete("a").await.unwrap());
        assert!(d.is_empty().await.unwrap());
        assert!(!d.contains_key("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_values_items() {
        let d = dict().await;
        d.set("a", &json!([1, 2])).await.unwrap();
        d.set("b", &json!(null)).await.unwrap();

        let mut keys = d.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        let values = d.values().await.unwrap();
        assert_eq!(values.len(), 2);
        assert!(values.contains(&json!([1, 2])));

        let mut items = d.items().await.unwrap();
        items.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(items, vec![("a".to_string(), json!([1, 2])), ("b".to_string(), json!(null))]);
    }

    #[tokio::test]
    async fn test_keys_are_stored_json_encoded() {
        let pool = DbPool::sqlite_memory().await.unwrap();
        let d = JsonDict::open(pool.clone(), "meta").await.unwrap();
        d.set("k", &json!("v")).await.unwrap();

        let DbPool::Sqlite(p) = &pool else { unreachable!() };
        let raw: (String, String) = sqlx::query_as("SELECT key, value FROM meta")
            .fetch_one(p)
            .await
            .unwrap();
        assert_eq!(raw, ("\"k\"".to_string(), "\"v\"".to_string()));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_decode_error() {
        let pool = DbPool::sqlite_memory().await.unwrap();
        let d = JsonDict::open(pool.clone(), "meta").await.unwrap();
        let DbPool::Sqlite(p) = &pool else { unreachable!() };
        sqlx::query("INSERT INTO meta (key, value) VALUES ('\"k\"', '{broken')")
            .execute(p)
            .await
            .unwrap();

        assert!(matches!(d.get("k").await, Err(DbError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_open_rejects_bad_table() {
        let pool = DbPool::sqlite_memory().await.unwrap();
        let err = JsonDict::open(pool, "dict; DROP TABLE x").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidTable(_)));
    }
}
