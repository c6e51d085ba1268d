use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::project::normalize_path;

/// Metadata stored alongside each chunk vector.
///
/// `file_path` is the absolute, forward-slash path of the source file. Every
/// lookup for mutation or deletion filters on it, since point ids are
/// regenerated on each reindex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
  pub file_path: String,
  pub file_name: String,
  /// Lowercased extension without the dot, empty when the file has none
  pub file_type: String,
  /// 1-based, inclusive
  pub line_start: u32,
  /// 1-based, inclusive
  pub line_end: u32,
  pub project: String,
  pub chunk_index: u32,
  pub total_chunks: u32,
  pub updated_at: DateTime<Utc>,
  pub content: String,
}

/// One stored chunk: point id, embedding and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
  pub id: Uuid,
  pub vector: Vec<f32>,
  pub payload: VectorPayload,
}

/// A search hit returned by the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
  pub id: Uuid,
  /// Similarity, higher is closer
  pub score: f32,
  pub payload: VectorPayload,
}

/// A point returned by a scroll, without its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
  pub id: Uuid,
  pub payload: VectorPayload,
}

/// File identity fields shared by every chunk of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
  pub file_path: String,
  pub file_name: String,
  pub file_type: String,
}

impl FileIdentity {
  pub fn from_path(path: &Path) -> Self {
    Self {
      file_path: normalize_path(path),
      file_name: path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default(),
      file_type: path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default(),
    }
  }
}
