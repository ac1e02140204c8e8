//! Tracing setup shared by Claimflow binaries.
//!
//! Events go to two sinks: a size-capped rolling file under
//! `~/.claimflow/logs` and stderr. `RUST_LOG` overrides the default filter
//! for both.

mod rolling;

use anyhow::{Context, Result};
use rolling::{RollingFile, RotationPolicy, SharedRollingFile};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "claimflow=info,claimflow_ingest=info";
const VERBOSE_LOG_FILTER: &str = "claimflow=debug,claimflow_ingest=debug";

const KEEP_LOG_FILES: usize = 5;
const MAX_LOG_FILE_BYTES: u64 = 10 * 1024 * 1024;

pub struct LogConfig<'a> {
    /// Base name of the log file
    pub app_name: &'a str,
    /// Mirror debug events to stderr
    pub verbose: bool,
    /// Directory for log files; defaults to [`logs_dir`]
    pub log_dir: Option<PathBuf>,
}

/// Install the global subscriber.
///
/// When the log file cannot be opened, events still reach stderr and a warning
/// names the cause. Fails only if a subscriber is already installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let (subscriber, file_error) = build_subscriber(&config, std::io::stderr);
    subscriber
        .try_init()
        .context("Failed to install tracing subscriber")?;
    if let Some(err) = file_error {
        tracing::warn!(
            target: "claimflow",
            error = %format!("{:#}", err),
            "File logging disabled, logging to stderr only"
        );
    }
    Ok(())
}

/// Registry with an optional rolling-file layer and a console layer writing to
/// `console`. The error is why the file layer is missing, if it is.
fn build_subscriber<W>(
    config: &LogConfig<'_>,
    console: W,
) -> (impl tracing::Subscriber + Send + Sync + 'static, Option<anyhow::Error>)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (file_layer, file_error) = match open_log_file(config) {
        Ok(file) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(SharedRollingFile::new(file))
                    .with_ansi(false)
                    .with_filter(env_filter_or(DEFAULT_LOG_FILTER)),
            ),
            None,
        ),
        Err(err) => (None, Some(err)),
    };

    let console_filter = if config.verbose {
        env_filter_or(VERBOSE_LOG_FILTER)
    } else {
        env_filter_or(DEFAULT_LOG_FILTER)
    };
    let subscriber = tracing_subscriber::registry().with(file_layer).with(
        tracing_subscriber::fmt::layer()
            .with_writer(console)
            .with_target(config.verbose)
            .with_filter(console_filter),
    );
    (subscriber, file_error)
}

fn open_log_file(config: &LogConfig<'_>) -> Result<RollingFile> {
    let dir = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            dir.clone()
        }
        None => ensure_logs_dir()?,
    };
    let policy = RotationPolicy {
        max_bytes: MAX_LOG_FILE_BYTES,
        keep: KEEP_LOG_FILES,
    };
    RollingFile::open(&dir, config.app_name, policy)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Claimflow home directory: `$CLAIMFLOW_HOME`, else `~/.claimflow`.
///
/// Falls back to the system temp directory when no home directory is known.
pub fn claimflow_home() -> PathBuf {
    if let Some(home) = std::env::var_os("CLAIMFLOW_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".claimflow")
}

pub fn logs_dir() -> PathBuf {
    claimflow_home().join("logs")
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}
