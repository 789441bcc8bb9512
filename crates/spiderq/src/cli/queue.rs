//! `spiderq queue` - inspect and edit a project's spider queue

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use serde_json::{json, Value};
use spiderq_store::{SpiderMessage, SpiderQueue, StoreConfig};
use tracing::info;

use crate::cli::output::emit;
use crate::cli::runtime;

#[derive(Subcommand, Debug, Clone)]
pub enum QueueAction {
    /// Number of pending spider runs
    Count {
        #[arg(long)]
        project: String,
    },
    /// Pending messages, highest priority first
    List {
        #[arg(long)]
        project: String,
    },
    /// Take the next message off the queue (prints `null` when empty)
    Pop {
        #[arg(long)]
        project: String,
    },
    /// Schedule a spider run
    Add {
        #[arg(long)]
        project: String,
        /// Spider name
        #[arg(long)]
        spider: String,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        priority: f64,
        /// Spider argument as KEY=VALUE (repeatable)
        #[arg(long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,
    },
    /// Drop every pending run of one spider
    Remove {
        #[arg(long)]
        project: String,
        #[arg(long)]
        spider: String,
    },
    /// Drop everything pending for the project
    Clear {
        #[arg(long)]
        project: String,
    },
}

pub fn run<W: Write + ?Sized>(action: QueueAction, config: &StoreConfig, out: &mut W) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        match action {
            QueueAction::Count { project } => {
                let queue = SpiderQueue::open(config, &project).await?;
                let count = queue.count().await?;
                emit(out, &json!({ "project": project, "count": count }))
            }
            QueueAction::List { project } => {
                let queue = SpiderQueue::open(config, &project).await?;
                for message in queue.list().await? {
                    emit(out, &message)?;
                }
                Ok(())
            }
            QueueAction::Pop { project } => {
                let queue = SpiderQueue::open(config, &project).await?;
                match queue.pop().await? {
                    Some(message) => emit(out, &message),
                    None => emit(out, &Value::Null),
                }
            }
            QueueAction::Add {
                project,
                spider,
                priority,
                args,
            } => {
                let queue = SpiderQueue::open(config, &project).await?;
                let args: SpiderMessage = args
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect();
                queue.add(&spider, priority, args).await?;
                info!(project = %project, spider = %spider, priority, "scheduled spider run");
                emit(
                    out,
                    &json!({ "project": project, "spider": spider, "priority": priority }),
                )
            }
            QueueAction::Remove { project, spider } => {
                let queue = SpiderQueue::open(config, &project).await?;
                let removed = queue
                    .remove(|message| message.get("name").and_then(Value::as_str) == Some(spider.as_str()))
                    .await?;
                info!(project = %project, spider = %spider, removed, "removed pending runs");
                emit(out, &json!({ "project": project, "removed": removed }))
            }
            QueueAction::Clear { project } => {
                let queue = SpiderQueue::open(config, &project).await?;
                queue.clear().await?;
                info!(project = %project, "cleared queue");
                emit(out, &json!({ "project": project, "cleared": true }))
            }
        }
    })
}

/// Split `KEY=VALUE` at the first `=`.
fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
