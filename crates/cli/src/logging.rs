//! Logging setup for CLI commands and the foreground daemon: console-only
//! for interactive commands, rotating file output under the data
//! directory's `logs/` subdirectory for the daemon.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub fn data_dir() -> PathBuf {
  indexer_core::paths::default_data_dir()
}

/// Console-only logging for interactive CLI commands.
pub fn init_cli_logging() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .try_init();
}

/// Daemon logging: console with colors in foreground mode, daily-rotating
/// file under `logs/` otherwise. Returns the guard that must stay alive
/// for the duration of the process when file logging is used.
pub fn init_daemon_logging(foreground: bool) -> Option<WorkerGuard> {
  let env_filter = EnvFilter::builder().with_default_directive(tracing::Level::INFO.into()).from_env_lossy();

  if foreground {
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).with_ansi(true).try_init();
    return None;
  }

  let log_dir = indexer_core::paths::logs_dir(&data_dir());
  if std::fs::create_dir_all(&log_dir).is_err() {
    init_cli_logging();
    return None;
  }

  let file_appender = tracing_appender::rolling::daily(&log_dir, "docdex.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .try_init();

  Some(guard)
}
