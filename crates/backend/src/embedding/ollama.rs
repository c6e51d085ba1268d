//! Local embeddings through an Ollama server.
//!
//! Batches go to `/api/embed` in sub-batches of `max_batch_size`, a few in
//! flight at once. Servers older than that endpoint answer 404, in which case
//! each text is sent to the legacy `/api/embeddings` endpoint instead.

use std::time::Instant;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::{EmbeddingError, EmbeddingMode, EmbeddingProvider, format_for_embedding};
use crate::domain::config::EmbeddingConfig;

/// Requests in flight per batch; the GPU serializes them anyway
const MAX_IN_FLIGHT: usize = 4;

/// Texts per request derived from the context window, between 1 and 64
fn batch_size_for_context(context_length: usize) -> usize {
  (context_length / 512).clamp(1, 64)
}

/// Whether `model` appears in the server's model list. A name without a tag
/// matches any tag of that model.
fn model_available(models: &[TagModel], model: &str) -> bool {
  models.iter().any(|m| {
    m.name == model || (!model.contains(':') && m.name.split_once(':').is_some_and(|(base, _)| base == model))
  })
}

#[derive(Debug, Clone)]
pub struct OllamaProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimensions: usize,
  max_batch_size: usize,
  query_instruction: Option<String>,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct EmbedRequest<'a> {
  model: &'a str,
  input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
  embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct LegacyEmbedRequest<'a> {
  model: &'a str,
  prompt: &'a str,
}

#[derive(Deserialize)]
struct LegacyEmbedResponse {
  embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
  #[serde(default)]
  models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
  name: String,
}

// ============================================================================
// Provider
// ============================================================================

impl OllamaProvider {
  pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
    let provider = Self {
      client: reqwest::Client::new(),
      base_url: config.ollama_url.trim_end_matches('/').to_string(),
      model: config.model.clone(),
      dimensions: config.dimensions,
      max_batch_size: config
        .max_batch_size
        .unwrap_or_else(|| batch_size_for_context(config.context_length))
        .max(1),
      query_instruction: config.query_instruction.clone(),
    };

    info!(
      base_url = %provider.base_url,
      model = %provider.model,
      dimensions = provider.dimensions,
      max_batch_size = provider.max_batch_size,
      "Ollama provider initialized"
    );
    Ok(provider)
  }

  fn url(&self, endpoint: &str) -> String {
    format!("{}/api/{}", self.base_url, endpoint)
  }

  async fn status_error(&self, response: reqwest::Response) -> EmbeddingError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    warn!(status, model = %self.model, "Ollama request failed");
    EmbeddingError::Status {
      provider: "ollama".to_string(),
      status,
      body,
    }
  }

  fn warn_on_dimensions(&self, vectors: &[Vec<f32>]) {
    if let Some(v) = vectors.iter().find(|v| v.len() != self.dimensions) {
      warn!(expected = self.dimensions, got = v.len(), model = %self.model, "Unexpected embedding dimensions");
    }
  }

  /// One `/api/embed` request
  async fn embed_request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let started = Instant::now();
    let response = self
      .client
      .post(self.url("embed"))
      .json(&EmbedRequest {
        model: &self.model,
        input: texts,
      })
      .send()
      .await
      .map_err(EmbeddingError::from_transport)?;

    if !response.status().is_success() {
      return Err(self.status_error(response).await);
    }

    let body: EmbedResponse = response.json().await?;
    if body.embeddings.len() != texts.len() {
      return Err(EmbeddingError::ProviderError(format!(
        "Batch size mismatch: got {} embeddings for {} inputs",
        body.embeddings.len(),
        texts.len()
      )));
    }

    trace!(batch_size = texts.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Ollama batch embedded");
    Ok(body.embeddings)
  }

  /// One `/api/embeddings` request, for servers without `/api/embed`
  async fn legacy_request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let response = self
      .client
      .post(self.url("embeddings"))
      .json(&LegacyEmbedRequest {
        model: &self.model,
        prompt: text,
      })
      .send()
      .await
      .map_err(EmbeddingError::from_transport)?;

    if !response.status().is_success() {
      return Err(self.status_error(response).await);
    }

    let body: LegacyEmbedResponse = response.json().await?;
    Ok(body.embedding)
  }

  /// Embed already formatted texts, order preserved
  async fn embed_formatted(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let requests: Vec<_> = texts.chunks(self.max_batch_size).map(|chunk| self.embed_request(chunk)).collect();
    let native = stream::iter(requests)
      .buffered(MAX_IN_FLIGHT)
      .try_collect::<Vec<_>>()
      .await;

    let vectors: Vec<Vec<f32>> = match native {
      Ok(sub_batches) => sub_batches.into_iter().flatten().collect(),
      Err(EmbeddingError::Status { status: 404, .. }) => {
        debug!(batch_size = texts.len(), "Ollama has no /api/embed, using /api/embeddings");
        let requests: Vec<_> = texts.iter().map(|text| self.legacy_request(text)).collect();
        stream::iter(requests)
          .buffered(MAX_IN_FLIGHT)
          .try_collect()
          .await?
      }
      Err(e) => return Err(e),
    };

    self.warn_on_dimensions(&vectors);
    Ok(vectors)
  }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
  fn name(&self) -> &str {
    "ollama"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  /// Server reachable and the configured model pulled
  async fn health_check(&self) -> Result<(), EmbeddingError> {
    let response = self
      .client
      .get(self.url("tags"))
      .send()
      .await
      .map_err(EmbeddingError::from_transport)?;

    if !response.status().is_success() {
      return Err(self.status_error(response).await);
    }

    let tags: TagsResponse = response.json().await?;
    if !model_available(&tags.models, &self.model) {
      return Err(EmbeddingError::ProviderError(format!(
        "model {} is not available on {}, run `ollama pull {}`",
        self.model, self.base_url, self.model
      )));
    }

    debug!(base_url = %self.base_url, model = %self.model, "Ollama reachable");
    Ok(())
  }

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    let formatted = format_for_embedding(self.query_instruction.as_deref(), text, mode);
    let mut vectors = self.embed_formatted(&[formatted.as_str()]).await?;
    vectors
      .pop()
      .ok_or_else(|| EmbeddingError::ProviderError("Ollama returned no embedding".to_string()))
  }

  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let formatted: Vec<String> = texts
      .iter()
      .map(|t| format_for_embedding(self.query_instruction.as_deref(), t, mode))
      .collect();
    let refs: Vec<&str> = formatted.iter().map(String::as_str).collect();

    self.embed_formatted(&refs).await
  }
}
