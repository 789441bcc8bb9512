//! `spiderq kv` - read and write a JSON key-value table

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::{json, Value};
use spiderq_store::{kv, DbPool, JsonDict, StoreConfig};
use tracing::info;

use crate::cli::output::emit;
use crate::cli::{runtime, DEFAULT_DB_NAME};

#[derive(Args, Debug, Clone)]
pub struct KvArgs {
    /// Table name
    #[arg(long, global = true, default_value = kv::DEFAULT_TABLE)]
    pub table: String,

    /// SQLite file stem under the dbs directory (ignored for PostgreSQL)
    #[arg(long, global = true, default_value = DEFAULT_DB_NAME)]
    pub db: String,

    #[command(subcommand)]
    pub action: KvAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum KvAction {
    /// Print the value stored under KEY
    Get { key: String },
    /// Store VALUE under KEY; VALUE is parsed as JSON, or taken as a string
    Set { key: String, value: String },
    /// Remove KEY if present
    Delete { key: String },
    /// Print every key
    Keys,
}

pub fn run<W: Write + ?Sized>(args: KvArgs, config: &StoreConfig, out: &mut W) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let pool = DbPool::connect(config, &args.db).await?;
        let dict = JsonDict::open(pool.clone(), &args.table).await?;

        let result = match args.action {
            KvAction::Get { key } => {
                let value = dict.get(&key).await?;
                emit(out, &value)
            }
            KvAction::Set { key, value } => {
                let value = parse_value(&value);
                dict.set(&key, &value).await?;
                info!(table = %args.table, key = %key, "stored value");
                emit(out, &json!({ "key": key, "value": value }))
            }
            KvAction::Delete { key } => {
                let deleted = dict.delete(&key).await?;
                emit(out, &json!({ "key": key, "deleted": deleted }))
            }
            KvAction::Keys => {
                for key in dict.keys().await? {
                    emit(out, &key)?;
                }
                Ok(())
            }
        };

        pool.close().await;
        result
    })
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::output::lines;
    use spiderq_store::DbError;
    use tempfile::TempDir;

    fn kv_args(action: KvAction) -> KvArgs {
        KvArgs {
            table: kv::DEFAULT_TABLE.to_string(),
            db: DEFAULT_DB_NAME.to_string(),
            action,
        }
    }

    fn exec(action: KvAction, config: &StoreConfig) -> Result<Vec<Value>> {
        let mut buf = Vec::new();
        run(kv_args(action), config, &mut buf)?;
        Ok(lines(&buf))
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("{\"a\": [1, 2]}"), json!({"a": [1, 2]}));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("plain text"), json!("plain text"));
    }

    #[test]
    fn test_set_get_keys_delete() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::sqlite(tmp.path());

        let set = KvAction::Set {
            key: "job-1".to_string(),
            value: "{\"status\": \"running\"}".to_string(),
        };
        exec(set, &config).unwrap();
        exec(
            KvAction::Set {
                key: "job-2".to_string(),
                value: "done".to_string(),
            },
            &config,
        )
        .unwrap();

        let got = exec(KvAction::Get { key: "job-1".to_string() }, &config).unwrap();
        assert_eq!(got, vec![json!({"status": "running"})]);

        let mut keys = exec(KvAction::Keys, &config).unwrap();
        keys.sort_by_key(|k| k.as_str().map(str::to_string));
        assert_eq!(keys, vec![json!("job-1"), json!("job-2")]);

        let deleted = exec(KvAction::Delete { key: "job-1".to_string() }, &config).unwrap();
        assert_eq!(deleted, vec![json!({"key": "job-1", "deleted": true})]);
        let again = exec(KvAction::Delete { key: "job-1".to_string() }, &config).unwrap();
        assert_eq!(again[0]["deleted"], false);
    }

    #[test]
    fn test_get_missing_key_fails() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::sqlite(tmp.path());

        let err = exec(KvAction::Get { key: "nope".to_string() }, &config).unwrap_err();
        let store_err = err.downcast_ref::<DbError>().unwrap();
        assert!(store_err.is_not_found());
    }
}
