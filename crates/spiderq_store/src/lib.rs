//! Durable job-state persistence for the spiderq scheduler.
//!
//! Three stores share one storage layer so that a scheduler process and any
//! number of worker processes can coordinate through a database instead of
//! shared memory:
//!
//! - [`JsonDict`]: string keys to JSON values, upsert semantics
//! - [`JsonPriorityQueue`]: highest-priority-first queue with at-most-once pop
//! - [`FinishedJobs`]: append-only job history with retention trimming
//!
//! [`SpiderQueue`] wraps the queue per project and picks the backend
//! (per-project SQLite file or shared PostgreSQL) from [`StoreConfig`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use spiderq_store::{SpiderQueue, StoreConfig};
//!
//! let config = StoreConfig::sqlite("./dbs");
//! let queue = SpiderQueue::open(&config, "myproject").await?;
//!
//! queue.add("quotes", 0.0, Default::default()).await?;
//! if let Some(run) = queue.pop().await? {
//!     // launch run["name"] ...
//! }
//! ```

pub mod codec;
mod config;
mod error;
pub mod finished;
pub mod kv;
mod pool;
pub mod queue;
pub mod spider_queue;
pub mod sql_guard;

pub use config::{DbType, StoreConfig};
pub use error::{DbError, Result};
pub use finished::{FinishedJob, FinishedJobRecord, FinishedJobs};
pub use kv::JsonDict;
pub use pool::DbPool;
pub use queue::JsonPriorityQueue;
pub use spider_queue::{SpiderMessage, SpiderQueue};
