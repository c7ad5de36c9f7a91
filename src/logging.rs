//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

const LOG_ENV: &str = "SKILLSYNC_LOG";
const LOG_FILE_PREFIX: &str = "skillsync.log";

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
  /// Daily rolling file under the configured log directory
  File,
  Stderr,
}

/// Install the global subscriber.
///
/// The returned guard flushes buffered file output on drop; keep it alive
/// for the life of the process.
pub fn init(config: &LoggingConfig, target: LogTarget) -> Result<Option<WorkerGuard>> {
  let filter = env_filter(config)?;

  match target {
    LogTarget::Stderr => {
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;
      Ok(None)
    }
    LogTarget::File => {
      let directory = log_dir(config)?;
      std::fs::create_dir_all(&directory).map_err(|e| {
        eyre!(
          "Failed to create log directory {}: {}",
          directory.display(),
          e
        )
      })?;

      let appender = tracing_appender::rolling::daily(&directory, LOG_FILE_PREFIX);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;
      Ok(Some(guard))
    }
  }
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
  match std::env::var(LOG_ENV) {
    Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(&directive)
      .map_err(|e| eyre!("Invalid {} directive '{}': {}", LOG_ENV, directive, e)),
    _ => level_filter(&config.level),
  }
}

fn level_filter(level: &str) -> Result<EnvFilter> {
  EnvFilter::try_new(level).map_err(|e| eyre!("Invalid logging.level '{}': {}", level, e))
}

fn log_dir(config: &LoggingConfig) -> Result<PathBuf> {
  if let Some(dir) = &config.directory {
    return Ok(dir.clone());
  }
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(logs_under(&data_dir))
}

fn logs_under(data_dir: &Path) -> PathBuf {
  data_dir.join("skillsync").join("logs")
}
