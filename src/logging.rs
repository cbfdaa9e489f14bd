use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log directory: $STRIP_WORKER_LOG_PATH, else $XDG_DATA_HOME/strip-worker/logs
fn log_dir() -> Result<PathBuf> {
  if let Ok(path) = std::env::var("STRIP_WORKER_LOG_PATH") {
    return Ok(PathBuf::from(path));
  }

  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("strip-worker").join("logs"))
}

/// Install the global subscriber writing to a daily rolling file.
///
/// Stdout is reserved for notification events, so nothing is logged there.
/// The returned guard flushes pending lines on drop and must outlive the program.
pub fn init() -> Result<WorkerGuard> {
  let dir = log_dir()?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let file_appender = tracing_appender::rolling::daily(&dir, "strip-worker.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_target(true)
    .with_ansi(false)
    .with_writer(non_blocking)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}
