use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use super::{EmbeddingError, EmbeddingMode, EmbeddingProvider, format_for_embedding};
use crate::domain::config::EmbeddingConfig;

/// Client for OpenAI-compatible `/embeddings` endpoints
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
  client: reqwest::Client,
  base_url: String,
  api_key: String,
  model: String,
  dimensions: usize,
  /// Maximum texts per request
  max_batch_size: usize,
  query_instruction: Option<String>,
}

impl OpenAiProvider {
  pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
    let api_key = match &config.api_key {
      Some(key) if !key.is_empty() => key.clone(),
      _ => Self::key_from_env().ok_or(EmbeddingError::NoApiKey)?,
    };

    let base_url = config.openai_url.trim_end_matches('/').to_string();
    let model = config.model.clone();
    let dimensions = config.dimensions;
    let max_batch_size = config.max_batch_size.unwrap_or(64).max(1);
    let query_instruction = config.query_instruction.clone();

    info!(
      base_url,
      model,
      dimensions,
      max_batch_size,
      has_query_instruction = query_instruction.as_ref().is_some_and(|s| !s.is_empty()),
      "OpenAI provider initialized"
    );

    Ok(Self {
      client: reqwest::Client::new(),
      base_url,
      api_key,
      model,
      dimensions,
      max_batch_size,
      query_instruction,
    })
  }

  fn key_from_env() -> Option<String> {
    match std::env::var("OPENAI_API_KEY") {
      Ok(key) if !key.is_empty() => {
        debug!("OPENAI_API_KEY found in environment");
        Some(key)
      }
      _ => {
        debug!("OPENAI_API_KEY not set");
        None
      }
    }
  }

  fn embeddings_url(&self) -> String {
    format!("{}/embeddings", self.base_url)
  }

  fn models_url(&self) -> String {
    format!("{}/models", self.base_url)
  }

  async fn error_from_response(&self, response: reqwest::Response, batch_size: usize) -> EmbeddingError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
      401 | 403 => error!(status = %status, model = %self.model, "OpenAI authentication failed"),
      429 => warn!(status = %status, batch_size, model = %self.model, "OpenAI rate limit exceeded"),
      _ => warn!(status = %status, batch_size, model = %self.model, "OpenAI embedding request failed"),
    }

    EmbeddingError::Status {
      provider: "openai".to_string(),
      status: status.as_u16(),
      body,
    }
  }

  /// One request carrying every text in `texts`
  async fn embed_single_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let request = EmbeddingRequest {
      model: &self.model,
      input: EmbeddingInput::Batch(texts.to_vec()),
    };

    trace!(batch_size = texts.len(), model = %self.model, "Sending batch embedding request");
    let start = Instant::now();

    let response = self
      .client
      .post(self.embeddings_url())
      .bearer_auth(&self.api_key)
      .json(&request)
      .send()
      .await
      .map_err(EmbeddingError::from_transport)?;

    trace!(
      status = %response.status(),
      elapsed_ms = start.elapsed().as_millis(),
      "Received batch embedding response"
    );

    if !response.status().is_success() {
      return Err(self.error_from_response(response, texts.len()).await);
    }

    let mut result: EmbeddingResponse = response.json().await?;

    if result.data.len() != texts.len() {
      error!(
        expected = texts.len(),
        got = result.data.len(),
        model = %self.model,
        "Batch size mismatch in embedding response"
      );
      return Err(EmbeddingError::ProviderError(format!(
        "Batch size mismatch: got {} embeddings for {} inputs",
        result.data.len(),
        texts.len()
      )));
    }

    // the API may return items out of order; `index` is authoritative
    result.data.sort_by_key(|d| d.index);
    Ok(result.data.into_iter().map(|d| d.embedding).collect())
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: EmbeddingInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
  Single(&'a str),
  Batch(Vec<&'a str>),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  #[serde(default)]
  index: usize,
  embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
  fn name(&self) -> &str {
    "openai"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn health_check(&self) -> Result<(), EmbeddingError> {
    let response = self
      .client
      .get(self.models_url())
      .bearer_auth(&self.api_key)
      .send()
      .await
      .map_err(EmbeddingError::from_transport)?;

    if !response.status().is_success() {
      return Err(self.error_from_response(response, 0).await);
    }
    debug!(base_url = %self.base_url, "OpenAI endpoint reachable");
    Ok(())
  }

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    let formatted = format_for_embedding(self.query_instruction.as_deref(), text, mode);

    let request = EmbeddingRequest {
      model: &self.model,
      input: EmbeddingInput::Single(&formatted),
    };

    trace!(text_len = text.len(), mode = ?mode, model = %self.model, "Sending single embedding request");

    let response = self
      .client
      .post(self.embeddings_url())
      .bearer_auth(&self.api_key)
      .json(&request)
      .send()
      .await
      .map_err(EmbeddingError::from_transport)?;

    if !response.status().is_success() {
      return Err(self.error_from_response(response, 1).await);
    }

    let result: EmbeddingResponse = response.json().await?;
    result
      .data
      .into_iter()
      .next()
      .map(|d| d.embedding)
      .ok_or_else(|| EmbeddingError::ProviderError("No embedding in response".to_string()))
  }

  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let formatted: Vec<String> = texts
      .iter()
      .map(|t| format_for_embedding(self.query_instruction.as_deref(), t, mode))
      .collect();
    let formatted_refs: Vec<&str> = formatted.iter().map(|s| s.as_str()).collect();

    let start = Instant::now();
    let mut all_embeddings = Vec::with_capacity(texts.len());
    for chunk in formatted_refs.chunks(self.max_batch_size) {
      all_embeddings.extend(self.embed_single_batch(chunk).await?);
    }

    debug!(
      batch_size = texts.len(),
      sub_batches = texts.len().div_ceil(self.max_batch_size),
      elapsed_ms = start.elapsed().as_millis(),
      "OpenAI batch embedding complete"
    );

    Ok(all_embeddings)
  }
}
