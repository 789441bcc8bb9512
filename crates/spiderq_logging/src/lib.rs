//! Logging setup for spiderq binaries.
//!
//! Library crates only emit `tracing` events; a binary calls [`init_logging`]
//! once and holds the returned [`LogGuard`] until exit so buffered file output
//! is flushed.
//!
//! Files go to `$SPIDERQ_HOME/logs/<app>.<date>.log` (default home
//! `~/.spiderq`), one per day, keeping the last [`MAX_LOG_FILES`]. stdout
//! carries command output, so console logging always goes to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// File filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "spiderq=info,spiderq_store=info";
/// Daily files kept per app.
pub const MAX_LOG_FILES: usize = 7;

pub struct LogConfig<'a> {
    /// File name prefix
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only
    pub verbose: bool,
    /// Override for [`logs_dir`]
    pub log_dir: Option<PathBuf>,
}

/// Keeps the background file writer alive.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// A log directory that cannot be created only disables the file layer; the
/// stderr layer is always installed. Fails if a subscriber is already set.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let log_dir = config.log_dir.unwrap_or_else(logs_dir);

    let (file_layer, guard) = match file_appender(&log_dir, config.app_name) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter());
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Warning: file logging disabled: {e:#}");
            (None, None)
        }
    };

    let console_filter = if config.verbose {
        file_filter()
    } else {
        EnvFilter::new("warn")
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: guard })
}

/// `$SPIDERQ_HOME`, else `~/.spiderq`.
pub fn spiderq_home() -> PathBuf {
    if let Ok(home) = std::env::var("SPIDERQ_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".spiderq")
}

pub fn logs_dir() -> PathBuf {
    spiderq_home().join("logs")
}

fn file_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn file_appender(dir: &Path, app_name: &str) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(app_name)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}
