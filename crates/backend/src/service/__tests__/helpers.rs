//! Shared test helpers for service-level integration tests.

use std::{
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::{
  db::{DbError, Filter, MemoryStore, VectorStore},
  domain::{
    code::{IndexedVector, ScoredPoint, StoredPoint},
    config::IndexConfig,
    project::Project,
  },
  embedding::{EmbeddingError, EmbeddingGateway, EmbeddingMode, EmbeddingProvider, validation::InputLimit},
  service::code::IndexService,
};

pub const FAKE_DIMENSIONS: usize = 16;

/// Deterministic bag-of-bytes embedding: equal text gives equal vectors,
/// unrelated text gives distant ones.
pub fn fake_vector(text: &str) -> Vec<f32> {
  let mut vector = vec![0.0; FAKE_DIMENSIONS];
  vector[0] = 0.01;
  for byte in text.bytes() {
    vector[byte as usize % FAKE_DIMENSIONS] += 1.0;
  }
  vector
}

/// Offline embedding provider counting its calls
#[derive(Default)]
pub struct FakeEmbedding {
  pub batch_calls: AtomicUsize,
  pub texts_embedded: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedding {
  fn name(&self) -> &str {
    "fake"
  }

  fn model_id(&self) -> &str {
    "fake-bytes"
  }

  fn dimensions(&self) -> usize {
    FAKE_DIMENSIONS
  }

  async fn health_check(&self) -> Result<(), EmbeddingError> {
    Ok(())
  }

  async fn embed(&self, text: &str, _mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    self.texts_embedded.fetch_add(1, Ordering::SeqCst);
    Ok(fake_vector(text))
  }

  async fn embed_batch(&self, texts: &[&str], _mode: EmbeddingMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.batch_calls.fetch_add(1, Ordering::SeqCst);
    self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
    // yield so concurrent callers can interleave
    tokio::time::sleep(Duration::from_millis(5)).await;
    Ok(texts.iter().map(|t| fake_vector(t)).collect())
  }
}

/// Memory store whose upserts fail a set number of times
pub struct FlakyStore {
  pub inner: MemoryStore,
  pub upsert_failures: AtomicUsize,
  pub upsert_attempts: AtomicUsize,
}

impl FlakyStore {
  pub fn failing(times: usize) -> Self {
    Self {
      inner: MemoryStore::new(),
      upsert_failures: AtomicUsize::new(times),
      upsert_attempts: AtomicUsize::new(0),
    }
  }
}

#[async_trait]
impl VectorStore for FlakyStore {
  fn name(&self) -> &str {
    "flaky"
  }

  async fn ensure_collection(&self, collection: &str, dimensions: usize) -> crate::db::Result<()> {
    self.inner.ensure_collection(collection, dimensions).await
  }

  async fn upsert(&self, collection: &str, points: Vec<IndexedVector>) -> crate::db::Result<()> {
    self.upsert_attempts.fetch_add(1, Ordering::SeqCst);
    let remaining = self.upsert_failures.load(Ordering::SeqCst);
    if remaining > 0 {
      self.upsert_failures.store(remaining - 1, Ordering::SeqCst);
      return Err(DbError::Query("injected upsert failure".to_string()));
    }
    self.inner.upsert(collection, points).await
  }

  async fn delete_by_filter(&self, collection: &str, filter: &Filter) -> crate::db::Result<()> {
    self.inner.delete_by_filter(collection, filter).await
  }

  async fn search(
    &self,
    collection: &str,
    vector: &[f32],
    limit: usize,
    filter: Option<&Filter>,
  ) -> crate::db::Result<Vec<ScoredPoint>> {
    self.inner.search(collection, vector, limit, filter).await
  }

  async fn scroll(
    &self,
    collection: &str,
    filter: Option<&Filter>,
    limit: Option<usize>,
  ) -> crate::db::Result<Vec<StoredPoint>> {
    self.inner.scroll(collection, filter, limit).await
  }
}

/// Config tuned for fast tests
pub fn test_index_config() -> IndexConfig {
  IndexConfig {
    chunk_size_chars: 200,
    chunk_overlap_chars: 40,
    max_file_size: 4096,
    max_concurrent_jobs: 4,
    write_retry_backoff_ms: 1,
    ..Default::default()
  }
}

pub fn gateway(provider: Arc<FakeEmbedding>) -> Arc<EmbeddingGateway> {
  Arc::new(EmbeddingGateway::new(
    vec![provider as Arc<dyn EmbeddingProvider>],
    Duration::from_millis(200),
    InputLimit::for_context_length(8192),
  ))
}

/// Temp project, in-memory store and fake embeddings wired into an [`IndexService`].
///
/// The temp directory is removed when the context is dropped.
pub struct TestContext {
  _temp_dir: TempDir,
  pub project: Project,
  pub store: Arc<MemoryStore>,
  pub embedding: Arc<FakeEmbedding>,
  pub service: Arc<IndexService>,
}

impl TestContext {
  pub fn new() -> Self {
    Self::with_config(test_index_config())
  }

  pub fn with_config(config: IndexConfig) -> Self {
    let temp_dir = TempDir::new().expect("create temp dir");
    let project = Project::from_root(temp_dir.path());
    let store = Arc::new(MemoryStore::new());
    let embedding = Arc::new(FakeEmbedding::default());
    let service = IndexService::new(config, gateway(embedding.clone()), store.clone());

    Self {
      _temp_dir: temp_dir,
      project,
      store,
      embedding,
      service: Arc::new(service),
    }
  }

  pub fn root(&self) -> &Path {
    self.project.root()
  }

  /// Write a file relative to the project root, creating parent directories
  pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let path = self.root().join(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(&path, content).expect("write test file");
    path
  }

  pub fn collection(&self) -> String {
    self.project.collection()
  }

  /// Stored chunk count for one file
  pub async fn chunks_for(&self, path: &Path) -> usize {
    let file_path = crate::domain::project::normalize_path(path);
    self
      .store
      .scroll(&self.collection(), Some(&Filter::file_path(file_path)), None)
      .await
      .expect("scroll")
      .len()
  }
}
