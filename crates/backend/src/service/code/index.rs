//! Indexing orchestrator.
//!
//! Turns file events into vector-store state. For `Add`/`Change` the file's
//! previous vectors are deleted first, then the file is classified, read (or
//! extracted), chunked and embedded, and the new vectors replace whatever is
//! stored for its path. `Unlink` only deletes.
//!
//! Every event for a path runs under that path's lock, so two runs for the
//! same file never interleave their delete and insert steps. Pruning of
//! stored files that left the disk takes the same locks.

use std::{
  collections::{BTreeSet, HashSet},
  future::Future,
  path::{Path, PathBuf},
  sync::Arc,
  time::{Duration, Instant},
};

use chrono::Utc;
use dashmap::DashMap;
use futures::{StreamExt, stream};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::scan::scan_project;
use crate::{
  context::files::{
    DocumentKind, FileClassification,
    chunker::chunk_text,
    classify,
    extract::DocumentExtractor,
    ignore::IgnoreRuleSet,
    read_sample,
  },
  db::{DbError, Filter, PayloadField, VectorStore},
  domain::{
    code::{FileIdentity, IndexedVector, VectorPayload},
    config::IndexConfig,
    event::{FileEvent, FileEventKind},
    project::{Project, normalize_path},
  },
  embedding::{EmbeddingGateway, EmbeddingMode},
  service::util::IndexError,
};

/// File paths per delete request during cleanup
const CLEANUP_DELETE_BATCH: usize = 256;

// ============================================================================
// Outcomes
// ============================================================================

/// Why a file produced no vectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  Binary,
  NotAFile,
  TooLarge { size: u64, limit: u64 },
  /// No text to index after reading or extraction
  Empty,
  /// Extractable document but no extractor configured
  NoExtractor(DocumentKind),
}

impl std::fmt::Display for SkipReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SkipReason::Binary => write!(f, "binary"),
      SkipReason::NotAFile => write!(f, "not a regular file"),
      SkipReason::TooLarge { size, limit } => write!(f, "too large ({} > {} bytes)", size, limit),
      SkipReason::Empty => write!(f, "empty"),
      SkipReason::NoExtractor(kind) => write!(f, "no extractor for {}", kind),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
  Indexed { chunks: usize },
  /// Vectors deleted, nothing inserted (unlink, or the file vanished)
  Removed,
  Skipped(SkipReason),
}

/// Totals from a full project pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectIndexSummary {
  pub files_scanned: usize,
  pub files_indexed: usize,
  pub files_skipped: usize,
  pub files_failed: usize,
  /// Stored files dropped because they left the disk or are now ignored
  pub files_removed: usize,
  pub chunks_created: usize,
  pub duration: Duration,
}

/// Saturating conversion for payload counters
fn to_u32(value: usize) -> u32 {
  u32::try_from(value).unwrap_or(u32::MAX)
}

// ============================================================================
// Service
// ============================================================================

pub struct IndexService {
  config: IndexConfig,
  embedding: Arc<EmbeddingGateway>,
  store: Arc<dyn VectorStore>,
  extractor: Option<Arc<dyn DocumentExtractor>>,
  /// Per normalized path; entries are dropped once nobody holds them
  locks: DashMap<String, Arc<Mutex<()>>>,
  /// Vector width per collection, set once its creation succeeded.
  /// Concurrent first writers wait on the same cell.
  ensured: DashMap<String, Arc<OnceCell<usize>>>,
}

impl IndexService {
  pub fn new(config: IndexConfig, embedding: Arc<EmbeddingGateway>, store: Arc<dyn VectorStore>) -> Self {
    Self {
      config,
      embedding,
      store,
      extractor: None,
      locks: DashMap::new(),
      ensured: DashMap::new(),
    }
  }

  pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
    self.extractor = Some(extractor);
    self
  }

  pub fn config(&self) -> &IndexConfig {
    &self.config
  }

  pub fn embedding(&self) -> &Arc<EmbeddingGateway> {
    &self.embedding
  }

  pub fn store(&self) -> &Arc<dyn VectorStore> {
    &self.store
  }

  /// Number of live per-path locks
  pub fn active_locks(&self) -> usize {
    self.locks.len()
  }

  // ==========================================================================
  // Event entry points
  // ==========================================================================

  /// Run `work` while holding the lock for `key`, a normalized absolute path
  async fn with_path_lock<T>(&self, key: &str, work: impl Future<Output = T>) -> T {
    let lock = self.locks.entry(key.to_string()).or_default().clone();

    let result = {
      let _guard = lock.lock().await;
      work.await
    };

    drop(lock);
    self.locks.remove_if(key, |_, l| Arc::strong_count(l) == 1);
    result
  }

  /// Handle one file event under the path's single-flight lock.
  ///
  /// A relative path is taken from the project root.
  #[tracing::instrument(level = "debug", skip(self, event), fields(kind = %event.kind, file = %event.path.display()))]
  pub async fn on_file_event(&self, event: &FileEvent) -> Result<IndexOutcome, IndexError> {
    let project = &event.project;
    let Some(path) = project.resolve(&event.path) else {
      return Err(IndexError::InvalidPath(event.path.clone()));
    };

    let key = normalize_path(&path);
    let result = self
      .with_path_lock(&key, async {
        match event.kind {
          FileEventKind::Unlink => self.delete_file(project, &path).await,
          FileEventKind::Add | FileEventKind::Change => self.replace_file(project, &path).await,
        }
      })
      .await;

    match &result {
      Ok(outcome) => debug!(outcome = ?outcome, "File event handled"),
      Err(e) => warn!(kind = ?e.kind(), err = %e, "File event failed"),
    }
    result
  }

  pub async fn index_file(&self, project: &Project, path: &Path) -> Result<IndexOutcome, IndexError> {
    self
      .on_file_event(&FileEvent::new(FileEventKind::Add, path, project.clone()))
      .await
  }

  pub async fn update_file(&self, project: &Project, path: &Path) -> Result<IndexOutcome, IndexError> {
    self
      .on_file_event(&FileEvent::new(FileEventKind::Change, path, project.clone()))
      .await
  }

  pub async fn remove_file(&self, project: &Project, path: &Path) -> Result<IndexOutcome, IndexError> {
    self
      .on_file_event(&FileEvent::new(FileEventKind::Unlink, path, project.clone()))
      .await
  }

  // ==========================================================================
  // Per-file work (caller holds the path lock)
  // ==========================================================================

  async fn delete_file(&self, project: &Project, path: &Path) -> Result<IndexOutcome, IndexError> {
    let file_path = normalize_path(path);
    self
      .store
      .delete_by_filter(&project.collection(), &Filter::file_path(&file_path))
      .await?;
    debug!(file = %file_path, "Removed file vectors");
    Ok(IndexOutcome::Removed)
  }

  async fn replace_file(&self, project: &Project, path: &Path) -> Result<IndexOutcome, IndexError> {
    let collection = project.collection();
    let identity = FileIdentity::from_path(path);
    let filter = Filter::file_path(&identity.file_path);

    // pre-clean: whatever happens next, no stale chunks of an older version survive
    self.store.delete_by_filter(&collection, &filter).await?;

    let Some(text) = (match self.load_text(path).await {
      Ok(Ok(text)) => Some(text),
      Ok(Err(reason)) => {
        debug!(file = %identity.file_path, reason = %reason, "Skipping file");
        return Ok(IndexOutcome::Skipped(reason));
      }
      Err(IndexError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
      Err(e) => return Err(e),
    }) else {
      debug!(file = %identity.file_path, "File vanished before indexing");
      return Ok(IndexOutcome::Removed);
    };

    let chunks = chunk_text(&text, self.config.chunk_size_chars, self.config.chunk_overlap_chars);
    if chunks.is_empty() {
      return Ok(IndexOutcome::Skipped(SkipReason::Empty));
    }

    let start = Instant::now();
    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    let vectors = self.embedding.embed_batch(&contents, EmbeddingMode::Document).await?;
    trace!(
      file = %identity.file_path,
      chunks = chunks.len(),
      elapsed_ms = start.elapsed().as_millis(),
      "Chunks embedded"
    );

    let dimensions = vectors.first().map(|v| v.len()).unwrap_or_default();
    self.ensure_collection(&collection, dimensions).await?;

    let updated_at = Utc::now();
    let points: Vec<IndexedVector> = chunks
      .iter()
      .zip(vectors)
      .map(|(chunk, vector)| IndexedVector {
        id: Uuid::new_v4(),
        vector,
        payload: VectorPayload {
          file_path: identity.file_path.clone(),
          file_name: identity.file_name.clone(),
          file_type: identity.file_type.clone(),
          line_start: to_u32(chunk.line_start),
          line_end: to_u32(chunk.line_end),
          project: project.name().to_string(),
          chunk_index: to_u32(chunk.index),
          total_chunks: to_u32(chunk.total),
          updated_at,
          content: chunk.content.clone(),
        },
      })
      .collect();

    let count = points.len();
    self.write_file_vectors(&collection, path, &filter, points).await?;

    info!(file = %identity.file_path, chunks = count, "Indexed file");
    Ok(IndexOutcome::Indexed { chunks: count })
  }

  /// Classify, apply the size ceiling, and produce the file's text.
  /// The inner `Err` is a skip, not a failure.
  async fn load_text(&self, path: &Path) -> Result<Result<String, SkipReason>, IndexError> {
    // extension-only check first, no I/O
    let by_extension = classify(path, None);
    if by_extension == FileClassification::Binary {
      return Ok(Err(SkipReason::Binary));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
      return Ok(Err(SkipReason::NotAFile));
    }

    let classification = match by_extension {
      FileClassification::PlainText => {
        let sample = read_sample(path, self.config.sample_bytes).await?;
        classify(path, Some(&sample))
      }
      decided => decided,
    };

    let limit = match classification {
      FileClassification::Binary => return Ok(Err(SkipReason::Binary)),
      FileClassification::ExtractableDocument(_) => self.config.max_document_size,
      FileClassification::PlainText => self.config.max_file_size,
    };
    if metadata.len() > limit {
      return Ok(Err(SkipReason::TooLarge {
        size: metadata.len(),
        limit,
      }));
    }

    let text = match classification {
      FileClassification::ExtractableDocument(kind) => {
        let Some(extractor) = &self.extractor else {
          return Ok(Err(SkipReason::NoExtractor(kind)));
        };
        let extracted = extractor.extract(path, kind).await?;
        debug!(
          file = %path.display(),
          extractor = extractor.name(),
          chars = extracted.text.len(),
          "Extracted document text"
        );
        extracted.text
      }
      _ => {
        let bytes = tokio::fs::read(path).await?;
        String::from_utf8_lossy(&bytes).into_owned()
      }
    };

    Ok(Ok(text))
  }

  async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<(), IndexError> {
    let cell = self.ensured.entry(collection.to_string()).or_default().clone();
    let created = *cell
      .get_or_try_init(|| async {
        self.store.ensure_collection(collection, dimensions).await?;
        Ok::<_, DbError>(dimensions)
      })
      .await?;

    if created != dimensions {
      // let the store name the mismatch
      self.store.ensure_collection(collection, dimensions).await?;
    }
    Ok(())
  }

  /// Delete + insert as one unit, retried whole. A final failure leaves the
  /// file without vectors until its next successful reindex.
  async fn write_file_vectors(
    &self,
    collection: &str,
    path: &Path,
    filter: &Filter,
    points: Vec<IndexedVector>,
  ) -> Result<(), IndexError> {
    let attempts = self.config.write_retries.max(1);
    let backoff = Duration::from_millis(self.config.write_retry_backoff_ms);
    let mut attempt = 0;

    loop {
      attempt += 1;
      let result = match self.store.delete_by_filter(collection, filter).await {
        Ok(()) => self.store.upsert(collection, points.clone()).await,
        Err(e) => Err(e),
      };

      match result {
        Ok(()) => return Ok(()),
        // retrying cannot fix a width mismatch
        Err(e @ DbError::DimensionMismatch { .. }) => return Err(e.into()),
        Err(e) if attempt < attempts => {
          warn!(
            file = %path.display(),
            attempt,
            max_attempts = attempts,
            err = %e,
            "Vector write failed, retrying"
          );
          tokio::time::sleep(backoff * attempt).await;
        }
        Err(e) => {
          error!(
            file = %path.display(),
            attempts,
            err = %e,
            data_integrity_risk = true,
            "Vector write failed; file has no vectors until it is reindexed"
          );
          return Err(IndexError::Consistency {
            path: path.to_path_buf(),
            attempts,
            source: e,
          });
        }
      }
    }
  }

  // ==========================================================================
  // Project-wide operations
  // ==========================================================================

  /// Distinct `file_path` values stored for the project
  async fn stored_files(&self, project: &Project) -> Result<BTreeSet<String>, IndexError> {
    let points = self.store.scroll(&project.collection(), None, None).await?;
    Ok(points.into_iter().map(|p| p.payload.file_path).collect())
  }

  /// Delete the vectors of each candidate that is no longer a file on disk,
  /// lies outside the project, or is ignored by `rules`. The disk check runs
  /// under the path lock, so a file recreated meanwhile keeps its fresh
  /// vectors. Returns how many files were removed.
  async fn prune_stale(
    &self,
    project: &Project,
    candidates: Vec<String>,
    rules: Option<&IgnoreRuleSet>,
  ) -> Result<usize, IndexError> {
    let results: Vec<Result<bool, IndexError>> = stream::iter(candidates)
      .map(|file_path| async move {
        let ignored = match project.relative_str(&file_path) {
          None => true,
          Some(relative) => rules.is_some_and(|r| r.is_ignored(&relative, false)),
        };
        let path = PathBuf::from(&file_path);

        self
          .with_path_lock(&file_path, async {
            let gone = match tokio::fs::metadata(&path).await {
              Ok(metadata) => !metadata.is_file(),
              Err(e) => e.kind() == std::io::ErrorKind::NotFound,
            };
            if !(gone || ignored) {
              return Ok(false);
            }
            let deleted = self
              .store
              .delete_by_filter(&project.collection(), &Filter::file_path(&file_path))
              .await;
            if deleted.is_ok() {
              debug!(file = %file_path, gone, "Pruned stale file vectors");
            }
            deleted.map(|()| true).map_err(IndexError::from)
          })
          .await
      })
      .buffer_unordered(self.config.worker_count())
      .collect()
      .await;

    let mut removed = 0;
    let mut first_error = None;
    for result in results {
      match result {
        Ok(true) => removed += 1,
        Ok(false) => {}
        Err(e) => {
          warn!(kind = ?e.kind(), err = %e, "Failed to prune stale file");
          first_error.get_or_insert(e);
        }
      }
    }

    match first_error {
      Some(e) if removed == 0 => Err(e),
      _ => Ok(removed),
    }
  }

  /// Remove the vectors of every stored file under `dir` that no longer
  /// exists. Used when a directory is deleted or renamed away, where only the
  /// directory itself is reported. Returns the number of files removed.
  #[tracing::instrument(level = "debug", skip(self, project), fields(project = %project.name(), dir = %dir.display()))]
  pub async fn remove_tree(&self, project: &Project, dir: &Path) -> Result<usize, IndexError> {
    let Some(dir) = project.resolve(dir) else {
      return Err(IndexError::InvalidPath(dir.to_path_buf()));
    };
    let prefix = format!("{}/", normalize_path(&dir).trim_end_matches('/'));

    let under: Vec<String> = self
      .stored_files(project)
      .await?
      .into_iter()
      .filter(|file_path| file_path.starts_with(&prefix))
      .collect();
    if under.is_empty() {
      return Ok(0);
    }

    let removed = self.prune_stale(project, under, None).await?;
    info!(dir = %dir.display(), files_removed = removed, "Removed vectors under deleted directory");
    Ok(removed)
  }

  /// Delete vectors of every file the rule set now ignores. Returns the number
  /// of files removed.
  #[tracing::instrument(level = "debug", skip(self, project, rules), fields(project = %project.name()))]
  pub async fn cleanup_ignored(&self, project: &Project, rules: &IgnoreRuleSet) -> Result<usize, IndexError> {
    let collection = project.collection();
    let start = Instant::now();
    let points = self.store.scroll(&collection, None, None).await?;

    let mut ignored: Vec<String> = points
      .into_iter()
      .map(|p| p.payload.file_path)
      .filter(|file_path| {
        project
          .relative_str(file_path)
          .is_some_and(|relative| rules.is_ignored(&relative, false))
      })
      .collect();
    ignored.sort();
    ignored.dedup();

    for batch in ignored.chunks(CLEANUP_DELETE_BATCH) {
      self
        .store
        .delete_by_filter(&collection, &Filter::any_of(PayloadField::FilePath, batch.iter().cloned()))
        .await?;
    }

    info!(
      project = %project.name(),
      files_removed = ignored.len(),
      elapsed_ms = start.elapsed().as_millis(),
      "Removed vectors for newly ignored files"
    );
    Ok(ignored.len())
  }

  /// Index every eligible file under the project root, then drop stored
  /// files the scan no longer found
  pub async fn index_project(&self, project: &Project, rules: &IgnoreRuleSet) -> ProjectIndexSummary {
    let start = Instant::now();
    let scan = scan_project(project.root(), rules);
    let files_scanned = scan.files.len();
    let scanned: HashSet<String> = scan.files.iter().map(|p| normalize_path(p)).collect();

    info!(
      project = %project.name(),
      files = files_scanned,
      total_bytes = scan.total_bytes,
      scan_ms = scan.duration.as_millis(),
      "Project scan complete"
    );

    let results: Vec<(PathBuf, Result<IndexOutcome, IndexError>)> = stream::iter(scan.files)
      .map(|path| async move {
        let result = self.index_file(project, &path).await;
        (path, result)
      })
      .buffer_unordered(self.config.worker_count())
      .collect()
      .await;

    let mut summary = ProjectIndexSummary {
      files_scanned,
      ..Default::default()
    };
    for (path, result) in results {
      match result {
        Ok(IndexOutcome::Indexed { chunks }) => {
          summary.files_indexed += 1;
          summary.chunks_created += chunks;
        }
        Ok(_) => summary.files_skipped += 1,
        Err(e) => {
          summary.files_failed += 1;
          warn!(file = %path.display(), kind = ?e.kind(), err = %e, "Failed to index file");
        }
      }
    }

    match self.stored_files(project).await {
      Ok(stored) => {
        let stale: Vec<String> = stored.into_iter().filter(|p| !scanned.contains(p)).collect();
        if !stale.is_empty() {
          match self.prune_stale(project, stale, Some(rules)).await {
            Ok(removed) => summary.files_removed = removed,
            Err(e) => warn!(kind = ?e.kind(), err = %e, "Failed to remove stale files"),
          }
        }
      }
      Err(e) => warn!(kind = ?e.kind(), err = %e, "Failed to list stored files"),
    }
    summary.duration = start.elapsed();

    info!(
      project = %project.name(),
      indexed = summary.files_indexed,
      skipped = summary.files_skipped,
      failed = summary.files_failed,
      removed = summary.files_removed,
      chunks = summary.chunks_created,
      elapsed_ms = summary.duration.as_millis(),
      "Project indexing complete"
    );
    summary
  }
}
