// Retry wrapper for cloud embedding providers
//
// Transient failures (429, 5xx, network errors, timeouts) are retried with
// exponential backoff plus jitter. A batch rejected for any other reason is
// split in half and each half is sent on its own, which recovers from
// requests the provider considers too large.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, try_join};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::{EmbeddingError, EmbeddingMode, EmbeddingProvider};

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryConfig {
  /// Retries after the first attempt
  pub max_retries: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
  /// Adds up to 25% to each delay
  pub jitter: bool,
  /// Per-request deadline, a timeout counts as a transient failure
  pub request_timeout: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff: Duration::from_secs(1),
      max_backoff: Duration::from_secs(30),
      jitter: true,
      request_timeout: Duration::from_secs(60),
    }
  }
}

impl RetryConfig {
  /// Hosted APIs rate limit aggressively, so wait longer and try more often
  pub fn for_cloud() -> Self {
    Self {
      max_retries: 5,
      max_backoff: Duration::from_secs(60),
      request_timeout: Duration::from_secs(120),
      ..Self::default()
    }
  }

  /// Delay before retry number `retry` (0-based): doubles each time, capped.
  pub fn backoff(&self, retry: u32) -> Duration {
    let doubled = self.initial_backoff.saturating_mul(2u32.saturating_pow(retry));
    let capped = doubled.min(self.max_backoff);

    if self.jitter {
      capped.mul_f64(1.0 + jitter_fraction() * 0.25).min(self.max_backoff)
    } else {
      capped
    }
  }
}

/// Uniform value in `[0, 1)` drawn from a random v4 uuid
fn jitter_fraction() -> f64 {
  // the low 53 bits of a v4 uuid hold no version or variant bits
  let bits = (uuid::Uuid::new_v4().as_u128() as u64) & ((1u64 << 53) - 1);
  bits as f64 / (1u64 << 53) as f64
}

/// Rate limits, server errors and transport failures are worth retrying.
pub fn is_transient(error: &EmbeddingError) -> bool {
  match error {
    EmbeddingError::Network(_) | EmbeddingError::Timeout => true,
    EmbeddingError::Status { status, .. } => *status == 429 || *status >= 500,
    EmbeddingError::Request(e) => e.is_timeout() || e.is_connect(),
    _ => false,
  }
}

// ============================================================================
// Provider
// ============================================================================

pub struct ResilientProvider<P: EmbeddingProvider> {
  inner: P,
  config: RetryConfig,
}

impl<P: EmbeddingProvider> ResilientProvider<P> {
  pub fn with_config(inner: P, config: RetryConfig) -> Self {
    Self { inner, config }
  }

  /// Run `op` until it succeeds, fails permanently or runs out of retries.
  async fn retry<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, EmbeddingError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EmbeddingError>>,
  {
    let mut retry = 0;

    loop {
      let result = match timeout(self.config.request_timeout, op()).await {
        Ok(result) => result,
        Err(_) => Err(EmbeddingError::Timeout),
      };

      match result {
        Ok(value) => {
          if retry > 0 {
            info!(provider = self.inner.name(), what, retries = retry, "Embedding succeeded after retry");
          }
          return Ok(value);
        }
        Err(e) if is_transient(&e) && retry < self.config.max_retries => {
          let delay = self.config.backoff(retry);
          warn!(
            provider = self.inner.name(),
            what,
            attempt = retry + 1,
            max_retries = self.config.max_retries,
            delay_ms = delay.as_millis() as u64,
            err = %e,
            "Transient embedding failure, retrying"
          );
          sleep(delay).await;
          retry += 1;
        }
        Err(e) => {
          if is_transient(&e) {
            warn!(provider = self.inner.name(), what, retries = retry, err = %e, "Embedding retries exhausted");
          }
          return Err(e);
        }
      }
    }
  }

  /// Batch with retry; permanent failures split the batch until single inputs remain.
  fn embed_batch_split<'a>(
    &'a self,
    texts: &'a [&'a str],
    mode: EmbeddingMode,
  ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, EmbeddingError>> {
    async move {
      if texts.is_empty() {
        return Ok(Vec::new());
      }

      match self.retry("batch", || self.inner.embed_batch(texts, mode)).await {
        Ok(vectors) => Ok(vectors),
        Err(e) if texts.len() > 1 && !is_transient(&e) => {
          let (left, right) = texts.split_at(texts.len() / 2);
          debug!(
            batch_size = texts.len(),
            left = left.len(),
            right = right.len(),
            err = %e,
            "Batch rejected, splitting"
          );

          let (mut head, tail) = try_join(self.embed_batch_split(left, mode), self.embed_batch_split(right, mode)).await?;
          head.extend(tail);
          Ok(head)
        }
        Err(e) => Err(e),
      }
    }
    .boxed()
  }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for ResilientProvider<P> {
  fn name(&self) -> &str {
    self.inner.name()
  }

  fn model_id(&self) -> &str {
    self.inner.model_id()
  }

  fn dimensions(&self) -> usize {
    self.inner.dimensions()
  }

  fn supports_batch(&self) -> bool {
    self.inner.supports_batch()
  }

  /// Not retried, provider selection needs a quick answer
  async fn health_check(&self) -> Result<(), EmbeddingError> {
    self.inner.health_check().await
  }

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    self.retry("single", || self.inner.embed(text, mode)).await
  }

  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.embed_batch_split(texts, mode).await
  }
}
