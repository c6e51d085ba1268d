//! Logging setup for the CLI

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};
use vecsync::config::LogConfig;

const LOG_FILE_NAME: &str = "vecsync.log";

/// Directory for rolling log files (respects DATA_DIR / XDG_DATA_HOME)
pub fn log_dir() -> PathBuf {
  vecsync::dirs::default_log_dir()
}

/// Parse log level from config string
fn parse_log_level(level: &str) -> LevelFilter {
  match level.to_lowercase().as_str() {
    "off" => LevelFilter::OFF,
    "error" => LevelFilter::ERROR,
    "warn" => LevelFilter::WARN,
    "info" => LevelFilter::INFO,
    "debug" => LevelFilter::DEBUG,
    "trace" => LevelFilter::TRACE,
    _ => LevelFilter::INFO,
  }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
  // RUST_LOG overrides the configured level
  EnvFilter::builder()
    .with_default_directive(parse_log_level(&config.level).into())
    .from_env_lossy()
}

fn init_console(config: &LogConfig) {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter(config))
    .with_target(true)
    .with_ansi(true)
    .init();
}

/// Initialize logging from config.
///
/// Console with colors by default. With `to_file` the output goes to a
/// rolling file instead, rotated per `config.rotation`. Returns the guard
/// that must be kept alive for the duration of the program.
pub fn init_logging(config: &LogConfig, to_file: bool) -> Option<WorkerGuard> {
  if !to_file {
    init_console(config);
    return None;
  }

  let dir = log_dir();
  if let Err(e) = std::fs::create_dir_all(&dir) {
    init_console(config);
    tracing::warn!(dir = %dir.display(), err = %e, "Cannot create log directory, logging to console");
    return None;
  }

  let file_appender = match config.rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(&dir, LOG_FILE_NAME),
    "never" => tracing_appender::rolling::never(&dir, LOG_FILE_NAME),
    _ => tracing_appender::rolling::daily(&dir, LOG_FILE_NAME),
  };

  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter(config))
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}
