//! Per-project spider queue.
//!
//! Thin adapter the scheduler talks to: turns a spider run request into a
//! queue message (`{"name": spider, ...spider_args}`) and hides which backend
//! the project's queue lives in.

use serde_json::{Map, Value};

use crate::config::{DbType, StoreConfig};
use crate::error::{DbError, Result};
use crate::pool::DbPool;
use crate::queue::JsonPriorityQueue;
use crate::sql_guard::project_key;

/// Queue table inside a per-project SQLite file.
pub const SQLITE_TABLE: &str = "spider_queue";

/// A spider run request.
pub type SpiderMessage = Map<String, Value>;

/// Name of a project's queue table for the given backend.
///
/// SQLite keeps one file per project, so the table name is fixed. The shared
/// PostgreSQL database scopes the table by [`project_key`], which is distinct
/// for distinct projects.
pub fn table_for(db_type: DbType, project: &str) -> String {
    match db_type {
        DbType::Sqlite => SQLITE_TABLE.to_string(),
        DbType::Postgres => format!("{SQLITE_TABLE}_{}", project_key(project)),
    }
}

#[derive(Debug, Clone)]
pub struct SpiderQueue {
    project: String,
    queue: JsonPriorityQueue,
}

impl SpiderQueue {
    /// Open `project`'s queue on the backend `config` selects.
    pub async fn open(config: &StoreConfig, project: &str) -> Result<Self> {
        let pool = DbPool::connect(config, project).await?;
        Self::with_pool(pool, project).await
    }

    /// Open `project`'s queue on an existing pool.
    pub async fn with_pool(pool: DbPool, project: &str) -> Result<Self> {
        let table = table_for(pool.db_type(), project);
        let queue = JsonPriorityQueue::open(pool, &table).await?;
        Ok(Self {
            project: project.to_string(),
            queue,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Queue a run of spider `name`. `name` overrides any `name` in `args`.
    pub async fn add(&self, name: &str, priority: f64, args: SpiderMessage) -> Result<()> {
        let mut message = args;
        message.insert("name".to_string(), Value::String(name.to_string()));
        self.queue.put(&message, priority).await
    }

    /// Next run request, `None` when nothing is queued.
    pub async fn pop(&self) -> Result<Option<SpiderMessage>> {
        self.queue
            .pop()
            .await?
            .map(|value| self.as_message(value))
            .transpose()
    }

    pub async fn count(&self) -> Result<u64> {
        self.queue.len().await
    }

    /// Pending run requests in pop order.
    pub async fn list(&self) -> Result<Vec<SpiderMessage>> {
        self.queue
            .list()
            .await?
            .into_iter()
            .map(|(value, _)| self.as_message(value))
            .collect()
    }

    /// Drop every queued request matching `predicate`.
    pub async fn remove<F>(&self, mut predicate: F) -> Result<u64>
    where
        F: FnMut(&SpiderMessage) -> bool,
    {
        self.queue
            .remove(|value| value.as_object().is_some_and(&mut predicate))
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.queue.clear().await
    }

    fn as_message(&self, value: Value) -> Result<SpiderMessage> {
        serde_json::from_value(value).map_err(|source| DbError::Decode {
            context: self.queue.table().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn args(value: Value) -> SpiderMessage {
        value.as_object().cloned().unwrap()
    }

    async fn spider_queue() -> SpiderQueue {
        let pool = DbPool::sqlite_memory().await.unwrap();
        SpiderQueue::with_pool(pool, "demo").await.unwrap()
    }

    #[test]
    fn test_table_for_backend() {
        assert_eq!(table_for(DbType::Sqlite, "Demo-1"), "spider_queue");
        assert_eq!(table_for(DbType::Postgres, "demo_1"), "spider_queue_demo_1");
        assert!(table_for(DbType::Postgres, "Demo-1").starts_with("spider_queue_demo_1__"));
    }

    #[test]
    fn test_lookalike_projects_get_separate_tables() {
        let tables: Vec<String> = ["My-Project", "my_project", "my.project"]
            .iter()
            .map(|p| table_for(DbType::Postgres, p))
            .collect();
        assert_ne!(tables[0], tables[1]);
        assert_ne!(tables[0], tables[2]);
        assert_ne!(tables[1], tables[2]);
    }

    #[tokio::test]
    async fn test_lookalike_projects_get_separate_files() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::sqlite(tmp.path());

        let dashed = SpiderQueue::open(&config, "My-Project").await.unwrap();
        let plain = SpiderQueue::open(&config, "my_project").await.unwrap();
        dashed.add("s", 0.0, Map::new()).await.unwrap();

        assert_eq!(dashed.count().await.unwrap(), 1);
        assert_eq!(plain.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_merges_name() {
        let sq = spider_queue().await;
        sq.add("quotes", 0.0, args(json!({"_job": "abc", "name": "ignored", "arg1": "x"})))
            .await
            .unwrap();

        let msg = sq.pop().await.unwrap().unwrap();
        assert_eq!(Value::Object(msg), json!({"_job": "abc", "name": "quotes", "arg1": "x"}));
    }

    #[tokio::test]
    async fn test_list_count_remove_clear() {
        let sq = spider_queue().await;
        sq.add("a", 1.0, Map::new()).await.unwrap();
        sq.add("b", 5.0, Map::new()).await.unwrap();
        sq.add("c", 1.0, Map::new()).await.unwrap();
        assert_eq!(sq.count().await.unwrap(), 3);

        let names: Vec<Value> = sq.list().await.unwrap().into_iter().map(|m| m["name"].clone()).collect();
        assert_eq!(names, vec![json!("b"), json!("a"), json!("c")]);

        let removed = sq.remove(|m| m.get("name") == Some(&json!("a"))).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(sq.count().await.unwrap(), 2);

        sq.clear().await.unwrap();
        assert!(sq.pop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_object_message_is_decode_error() {
        let pool = DbPool::sqlite_memory().await.unwrap();
        let raw = JsonPriorityQueue::open(pool.clone(), SQLITE_TABLE).await.unwrap();
        raw.put(&json!(["not", "a", "map"]), 0.0).await.unwrap();

        let sq = SpiderQueue::with_pool(pool, "demo").await.unwrap();
        assert!(matches!(sq.pop().await, Err(DbError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_open_from_config_uses_project_file() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::sqlite(tmp.path());

        let one = SpiderQueue::open(&config, "one").await.unwrap();
        let two = SpiderQueue::open(&config, "two").await.unwrap();
        one.add("s", 0.0, Map::new()).await.unwrap();

        assert_eq!(one.count().await.unwrap(), 1);
        assert_eq!(two.count().await.unwrap(), 0);
        assert!(tmp.path().join("one.db").exists());
        assert!(tmp.path().join("two.db").exists());
    }
}
