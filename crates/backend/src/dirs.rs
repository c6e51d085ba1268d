use std::path::PathBuf;

/// Application directory name used under the platform data/config roots
pub const APP_DIR: &str = "vecsync";

/// Get the default base path for vecsync data
///
/// Respects the following environment variables (in order of precedence):
/// 1. DATA_DIR - explicit data directory override
/// 2. XDG_DATA_HOME - standard XDG data home directory
/// 3. dirs::data_local_dir() - platform default
pub fn default_data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("DATA_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(xdg_data).join(APP_DIR);
  }

  dirs::data_local_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(APP_DIR)
}

/// Get the default config directory
///
/// Same precedence as [`default_data_dir`], using CONFIG_DIR, XDG_CONFIG_HOME
/// and `dirs::config_dir()`.
pub fn default_config_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("CONFIG_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
    return PathBuf::from(xdg_config).join(APP_DIR);
  }

  dirs::config_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(APP_DIR)
}

/// Default location of the on-disk vector store
pub fn default_store_dir() -> PathBuf {
  default_data_dir().join("lancedb")
}

/// Default directory for rolling log files
pub fn default_log_dir() -> PathBuf {
  default_data_dir().join("logs")
}
