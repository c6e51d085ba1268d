mod gateway;
mod ollama;
mod openai;
mod resilient;
pub mod validation;

use std::sync::Arc;

pub use gateway::EmbeddingGateway;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
use resilient::{ResilientProvider, RetryConfig};

use crate::domain::config::{EmbeddingConfig, EmbeddingProvider as ConfigEmbeddingProvider};

/// Embedding mode determines how text is formatted before embedding.
///
/// Instruction-following embedding models produce better results when queries
/// are prefixed with a task instruction, while documents are embedded without
/// any prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingMode {
  /// Embedding a chunk for storage.
  /// Text is embedded as-is without any prefix.
  #[default]
  Document,
  /// Embedding a search query.
  /// Text is prefixed with the configured instruction, if any.
  Query,
}

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  /// Whether `embed_batch` maps to a native multi-input request. The gateway
  /// falls back to sequential `embed` calls when it does not.
  fn supports_batch(&self) -> bool {
    true
  }

  /// Cheap connectivity check used for provider selection
  async fn health_check(&self) -> Result<(), EmbeddingError>;

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError>;
  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

impl dyn EmbeddingProvider {
  pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider {
      ConfigEmbeddingProvider::Ollama => {
        let provider = OllamaProvider::new(config)?;

        Ok(Arc::new(provider))
      }
      ConfigEmbeddingProvider::OpenAi => {
        let provider = OpenAiProvider::new(config)?;

        // Wrap with retry logic (handles 429s, 5xx, timeouts)
        let resilient = ResilientProvider::with_config(provider, RetryConfig::for_cloud());
        Ok(Arc::new(resilient))
      }
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("No api key configured for provider")]
  NoApiKey,
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("{provider} returned {status}: {body}")]
  Status { provider: String, status: u16, body: String },
  #[error("Provider error: {0}")]
  ProviderError(String),
  #[error("Network error: {0}")]
  Network(String),
  #[error("Request timed out")]
  Timeout,
  #[error("No embedding provider reachable (tried: {})", .tried.join(", "))]
  Unavailable { tried: Vec<String> },
}

impl EmbeddingError {
  /// Map a transport error, keeping timeouts distinguishable
  pub(crate) fn from_transport(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      EmbeddingError::Timeout
    } else if e.is_connect() || e.is_request() {
      EmbeddingError::Network(e.to_string())
    } else {
      EmbeddingError::Request(e)
    }
  }
}

/// Prefix a query with the task instruction when one is configured
pub(crate) fn format_for_embedding(instruction: Option<&str>, text: &str, mode: EmbeddingMode) -> String {
  match (mode, instruction) {
    (EmbeddingMode::Query, Some(instruction)) if !instruction.is_empty() => {
      format!("Instruct: {}\nQuery:{}", instruction, text)
    }
    _ => text.to_string(),
  }
}
