//! Configuration system with per-project overrides.
//!
//! Config priority: project-relative (`.vecsync/config.toml`) > user
//! (`~/.config/vecsync/config.toml`) > built-in defaults. A file that fails to
//! parse is logged and the next layer is tried.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Rough characters-per-token ratio used to size embedding inputs
pub const CHARS_PER_TOKEN: usize = 4;

// ============================================================================
// Embedding Configuration
// ============================================================================

/// Embedding provider options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
  /// Local/self-hosted Ollama server
  #[default]
  Ollama,
  /// Any OpenAI-compatible `/embeddings` endpoint
  OpenAi,
}

impl std::fmt::Display for EmbeddingProvider {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EmbeddingProvider::Ollama => write!(f, "ollama"),
      EmbeddingProvider::OpenAi => write!(f, "openai"),
    }
  }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  /// Primary embedding provider
  pub provider: EmbeddingProvider,

  /// Secondary provider tried when the primary fails its connectivity check
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fallback: Option<EmbeddingProvider>,

  /// Model name for the primary provider
  pub model: String,

  /// Model name for the fallback provider (defaults to `model`)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fallback_model: Option<String>,

  /// Embedding dimensions; fixed per collection once created
  pub dimensions: usize,

  /// Ollama server URL
  pub ollama_url: String,

  /// Base URL of the OpenAI-compatible API
  pub openai_url: String,

  /// API key for the cloud provider. If not set, reads OPENAI_API_KEY.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,

  /// Model context length in tokens, used for batch sizing and truncation
  pub context_length: usize,

  /// Maximum texts per embedding request.
  /// Auto-calculated from context_length if not set: min(context_length / 512, 64)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_batch_size: Option<usize>,

  /// Optional task instruction prepended to search queries
  #[serde(skip_serializing_if = "Option::is_none")]
  pub query_instruction: Option<String>,

  /// Timeout for the provider connectivity check in milliseconds
  pub health_check_timeout_ms: u64,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: EmbeddingProvider::Ollama,
      fallback: None,
      model: "nomic-embed-text".to_string(),
      fallback_model: None,
      dimensions: 768,
      ollama_url: "http://localhost:11434".to_string(),
      openai_url: "https://api.openai.com/v1".to_string(),
      api_key: None,
      context_length: 8192,
      max_batch_size: None,
      query_instruction: None,
      health_check_timeout_ms: 3000,
    }
  }
}

impl EmbeddingConfig {
  /// Config view for the fallback provider, if one is configured
  pub fn fallback_config(&self) -> Option<EmbeddingConfig> {
    let provider = self.fallback?;
    Some(EmbeddingConfig {
      provider,
      fallback: None,
      model: self.fallback_model.clone().unwrap_or_else(|| self.model.clone()),
      fallback_model: None,
      ..self.clone()
    })
  }
}

// ============================================================================
// Index Configuration
// ============================================================================

/// Indexing pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
  /// Soft chunk size target in characters (default: 2000)
  pub chunk_size_chars: usize,

  /// Overlap carried between consecutive chunks in characters (default: 400)
  pub chunk_overlap_chars: usize,

  /// Maximum plain-text file size to index in bytes (default: 1MB)
  pub max_file_size: u64,

  /// Maximum extractable-document size in bytes (default: 20MB)
  pub max_document_size: u64,

  /// Bytes sampled from the head of a file for binary sniffing (default: 512)
  pub sample_bytes: usize,

  /// File watcher debounce in milliseconds (default: 500)
  pub watcher_debounce_ms: u64,

  /// Poll interval for the fallback polling watcher in seconds (default: 2)
  pub watcher_poll_secs: u64,

  /// Maximum concurrently running index jobs (0 = number of CPUs)
  pub max_concurrent_jobs: usize,

  /// Capacity of the bounded job queue (default: 256)
  pub queue_capacity: usize,

  /// Attempts for the delete+insert write unit (default: 3)
  pub write_retries: u32,

  /// Initial backoff between write attempts in milliseconds (default: 200)
  pub write_retry_backoff_ms: u64,

  /// How long shutdown waits for in-flight jobs in milliseconds (default: 10000)
  pub shutdown_grace_ms: u64,

  /// Name of the project-specific ignore override file
  pub ignore_file_name: String,
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      chunk_size_chars: 2000,
      chunk_overlap_chars: 400,
      max_file_size: 1024 * 1024,
      max_document_size: 20 * 1024 * 1024,
      sample_bytes: 512,
      watcher_debounce_ms: 500,
      watcher_poll_secs: 2,
      max_concurrent_jobs: 0,
      queue_capacity: 256,
      write_retries: 3,
      write_retry_backoff_ms: 200,
      shutdown_grace_ms: 10_000,
      ignore_file_name: ".vecsyncignore".to_string(),
    }
  }
}

impl IndexConfig {
  /// Worker count with the CPU-count default resolved
  pub fn worker_count(&self) -> usize {
    if self.max_concurrent_jobs == 0 {
      num_cpus::get().max(1)
    } else {
      self.max_concurrent_jobs
    }
  }
}

// ============================================================================
// Store Configuration
// ============================================================================

/// Vector store backend options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
  #[default]
  LanceDb,
  /// Process-local store, contents are lost on exit
  Memory,
}

/// Vector store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  pub backend: StoreBackend,

  /// Store location. Defaults to `<data_dir>/lancedb`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub uri: Option<String>,
}

impl StoreConfig {
  pub fn resolved_uri(&self) -> String {
    self
      .uri
      .clone()
      .unwrap_or_else(|| crate::dirs::default_store_dir().to_string_lossy().into_owned())
  }
}

// ============================================================================
// Log Configuration
// ============================================================================

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  pub level: String,

  /// Log file rotation: "daily", "hourly", "never"
  pub rotation: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      rotation: "daily".to_string(),
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub embedding: EmbeddingConfig,
  pub index: IndexConfig,
  pub store: StoreConfig,
  pub log: LogConfig,
}

impl Config {
  /// Load config for a project, with fallback to user config and defaults
  pub fn load_for_project(project_path: &Path) -> Self {
    if let Some(config) = Self::load_file(&Self::project_config_path(project_path)) {
      return config;
    }

    if let Some(config) = Self::user_config_path().and_then(|path| Self::load_file(&path)) {
      return config;
    }

    Self::default()
  }

  fn load_file(path: &Path) -> Option<Self> {
    if !path.exists() {
      return None;
    }

    let content = match std::fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) => {
        warn!(path = %path.display(), err = %e, "Failed to read config file");
        return None;
      }
    };

    match toml::from_str(&content) {
      Ok(config) => {
        debug!(path = %path.display(), "Loaded config");
        Some(config)
      }
      Err(e) => {
        warn!(path = %path.display(), err = %e, "Failed to parse config file, ignoring it");
        None
      }
    }
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join(crate::dirs::APP_DIR).join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join(crate::dirs::APP_DIR).join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".vecsync").join("config.toml")
  }
}
