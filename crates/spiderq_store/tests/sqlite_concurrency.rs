//! Cross-connection behaviour against a shared SQLite file.
//!
//! Each independent `DbPool` stands in for a separate process: they share
//! nothing but the database file.

use std::collections::HashSet;

use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use spiderq_store::{DbPool, FinishedJob, FinishedJobs, JsonDict, JsonPriorityQueue};
use tempfile::TempDir;

const ENTRIES: u64 = 120;
const CONSUMERS: usize = 6;

async fn loaded_queue(tmp: &TempDir) -> JsonPriorityQueue {
    let pool = DbPool::sqlite(tmp.path().join("queue.db")).await.unwrap();
    let queue = JsonPriorityQueue::open(pool, "queue").await.unwrap();
    for n in 0..ENTRIES {
        queue.put(&json!({ "n": n }), (n % 5) as f64).await.unwrap();
    }
    queue
}

async fn drain(queue: JsonPriorityQueue) -> Vec<u64> {
    let mut got = Vec::new();
    while let Some(message) = queue.pop().await.unwrap() {
        got.push(message["n"].as_u64().unwrap());
    }
    got
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pops_on_shared_pool_deliver_each_entry_once() {
    let tmp = TempDir::new().unwrap();
    let queue = loaded_queue(&tmp).await;

    let handles: Vec<_> = (0..CONSUMERS)
        .map(|_| tokio::spawn(drain(queue.clone())))
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort_unstable();
    assert_eq!(all, (0..ENTRIES).collect::<Vec<_>>());
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pops_from_independent_pools_deliver_each_entry_once() {
    let tmp = TempDir::new().unwrap();
    loaded_queue(&tmp).await;

    let mut handles = Vec::new();
    for _ in 0..CONSUMERS {
        let pool = DbPool::sqlite(tmp.path().join("queue.db")).await.unwrap();
        let queue = JsonPriorityQueue::open(pool, "queue").await.unwrap();
        handles.push(tokio::spawn(drain(queue)));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for n in handle.await.unwrap() {
            assert!(seen.insert(n), "entry {n} delivered twice");
        }
    }
    assert_eq!(seen.len() as u64, ENTRIES);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remove_racing_pops_never_double_counts() {
    let tmp = TempDir::new().unwrap();
    let queue = loaded_queue(&tmp).await;

    let poppers: Vec<_> = (0..3).map(|_| tokio::spawn(drain(queue.clone()))).collect();
    let remover = {
        let queue = queue.clone();
        tokio::spawn(async move {
            queue
                .remove(|m| m["n"].as_u64().is_some_and(|n| n % 2 == 0))
                .await
                .unwrap()
        })
    };

    let removed = remover.await.unwrap();
    let mut popped = HashSet::new();
    for handle in poppers {
        for n in handle.await.unwrap() {
            assert!(popped.insert(n), "entry {n} delivered twice");
        }
    }
    // anything left over after the poppers stopped
    let leftover = drain(queue).await;

    assert_eq!(popped.len() as u64 + removed + leftover.len() as u64, ENTRIES);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_schema_creation_is_safe() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("shared.db");
    // file exists and is in WAL mode before the race starts
    DbPool::sqlite(&path).await.unwrap().close().await;

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let path = path.clone();
            tokio::spawn(async move {
                let pool = DbPool::sqlite(&path).await.unwrap();
                JsonPriorityQueue::open(pool.clone(), "queue").await.unwrap();
                JsonDict::open(pool.clone(), "dict").await.unwrap();
                FinishedJobs::open(pool, "finished_jobs").await.unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_leave_one_row() {
    let tmp = TempDir::new().unwrap();
    let pool = DbPool::sqlite(tmp.path().join("dict.db")).await.unwrap();
    let dict = JsonDict::open(pool, "dict").await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let dict = dict.clone();
            tokio::spawn(async move { dict.set("job", &json!({ "writer": i })).await.unwrap() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(dict.len().await.unwrap(), 1);
    let value: Value = dict.get("job").await.unwrap();
    assert!(value["writer"].as_u64().is_some_and(|w| w < 8));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_trims_converge() {
    let tmp = TempDir::new().unwrap();
    let pool = DbPool::sqlite(tmp.path().join("finished.db")).await.unwrap();
    let ledger = FinishedJobs::open(pool, "finished_jobs").await.unwrap();

    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for n in 0..20 {
        ledger
            .add(&FinishedJob {
                project: "p".to_string(),
                spider: "s".to_string(),
                job: format!("{n:02}"),
                start_time: base + Duration::minutes(n),
                end_time: base + Duration::minutes(n + 1),
            })
            .await
            .unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.trim(Some(5)).await.unwrap() })
        })
        .collect();
    let mut removed = 0;
    for handle in handles {
        removed += handle.await.unwrap();
    }

    assert_eq!(removed, 15);
    let kept: Vec<String> = ledger.list().await.unwrap().into_iter().map(|r| r.job).collect();
    assert_eq!(kept, vec!["19", "18", "17", "16", "15"]);
}
