//! Provider selection and the embedding entry point used by the pipeline.
//!
//! Candidates are health checked in order (primary, then fallback) on first use. The
//! first one whose connectivity check passes is cached and serves every later
//! call until [`EmbeddingGateway::reset`] clears it.

use std::{sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
  EmbeddingError, EmbeddingMode, EmbeddingProvider,
  validation::InputLimit,
};
use crate::domain::config::EmbeddingConfig;

pub struct EmbeddingGateway {
  candidates: Vec<Arc<dyn EmbeddingProvider>>,
  health_timeout: Duration,
  selected: RwLock<Option<Arc<dyn EmbeddingProvider>>>,
  input_limit: InputLimit,
}

impl EmbeddingGateway {
  pub fn new(
    candidates: Vec<Arc<dyn EmbeddingProvider>>,
    health_timeout: Duration,
    input_limit: InputLimit,
  ) -> Self {
    Self {
      candidates,
      health_timeout,
      selected: RwLock::new(None),
      input_limit,
    }
  }

  /// Build the primary and optional fallback provider from config.
  ///
  /// A candidate that cannot be constructed (e.g. missing API key) is logged
  /// and left out. Fails only when no candidate could be built.
  pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
    let mut candidates = Vec::new();
    let mut first_error = None;

    let configs = std::iter::once(config.clone()).chain(config.fallback_config());
    for candidate_config in configs {
      match <dyn EmbeddingProvider>::from_config(&candidate_config) {
        Ok(provider) => candidates.push(provider),
        Err(e) => {
          warn!(provider = %candidate_config.provider, err = %e, "Embedding provider unavailable");
          first_error.get_or_insert(e);
        }
      }
    }

    if candidates.is_empty() {
      return Err(first_error.unwrap_or(EmbeddingError::Unavailable { tried: Vec::new() }));
    }

    Ok(Self::new(
      candidates,
      Duration::from_millis(config.health_check_timeout_ms),
      InputLimit::for_context_length(config.context_length),
    ))
  }

  /// The cached provider, probing candidates if none is selected yet
  pub async fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    if let Some(provider) = self.selected.read().await.as_ref() {
      return Ok(provider.clone());
    }

    let mut selected = self.selected.write().await;
    // another caller may have selected one while we waited for the lock
    if let Some(provider) = selected.as_ref() {
      return Ok(provider.clone());
    }

    let mut tried = Vec::with_capacity(self.candidates.len());
    for candidate in &self.candidates {
      tried.push(candidate.name().to_string());
      match tokio::time::timeout(self.health_timeout, candidate.health_check()).await {
        Ok(Ok(())) => {
          info!(
            provider = candidate.name(),
            model = candidate.model_id(),
            "Embedding provider selected"
          );
          *selected = Some(candidate.clone());
          return Ok(candidate.clone());
        }
        Ok(Err(e)) => warn!(provider = candidate.name(), err = %e, "Embedding provider health check failed"),
        Err(_) => warn!(
          provider = candidate.name(),
          timeout_ms = self.health_timeout.as_millis(),
          "Embedding provider health check timed out"
        ),
      }
    }

    Err(EmbeddingError::Unavailable { tried })
  }

  /// Forget the selected provider; the next call checks again
  pub async fn reset(&self) {
    if self.selected.write().await.take().is_some() {
      debug!("Embedding provider selection cleared");
    }
  }

  pub async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    let provider = self.provider().await?;
    provider.embed(&self.input_limit.fit(text), mode).await
  }

  /// Embed `texts`; `output[i]` corresponds to `texts[i]`.
  #[tracing::instrument(level = "trace", skip(self, texts), fields(batch_size = texts.len()))]
  pub async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let provider = self.provider().await?;
    let fitted: Vec<_> = texts.iter().map(|t| self.input_limit.fit(t)).collect();
    let refs: Vec<&str> = fitted.iter().map(|s| s.as_ref()).collect();

    let embeddings = if provider.supports_batch() {
      provider.embed_batch(&refs, mode).await?
    } else {
      let mut out = Vec::with_capacity(refs.len());
      for text in &refs {
        out.push(provider.embed(text, mode).await?);
      }
      out
    };

    if embeddings.len() != texts.len() {
      return Err(EmbeddingError::ProviderError(format!(
        "Batch size mismatch: got {} embeddings for {} inputs",
        embeddings.len(),
        texts.len()
      )));
    }

    Ok(embeddings)
  }
}
