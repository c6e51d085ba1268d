//! Semantic code search over a project's collection.

use tracing::debug;

use super::index::IndexService;
use crate::{
  db::{Filter, PayloadField},
  domain::{code::ScoredPoint, project::Project},
  embedding::EmbeddingMode,
  service::util::IndexError,
};

/// Parameters for code search.
#[derive(Debug, Clone)]
pub struct SearchParams {
  pub query: String,
  /// Restrict hits to one extension, e.g. `rs` or `.rs`
  pub file_type: Option<String>,
  pub limit: usize,
}

impl SearchParams {
  pub fn new(query: impl Into<String>) -> Self {
    Self {
      query: query.into(),
      file_type: None,
      limit: 10,
    }
  }

  pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
    self.file_type = Some(file_type.into());
    self
  }

  pub fn with_limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }
}

/// `.RS` and `rs` name the same file type
fn normalize_file_type(file_type: &str) -> String {
  file_type.trim().trim_start_matches('.').to_lowercase()
}

impl IndexService {
  /// Embed the query and return the nearest chunks, best first.
  ///
  /// A blank query or zero limit returns no hits without touching the
  /// embedding provider. A missing collection yields no hits.
  pub async fn search_code(&self, project: &Project, params: &SearchParams) -> Result<Vec<ScoredPoint>, IndexError> {
    let query = params.query.trim();
    if query.is_empty() || params.limit == 0 {
      return Ok(Vec::new());
    }

    let vector = self.embedding().embed(query, EmbeddingMode::Query).await?;
    let filter = params
      .file_type
      .as_deref()
      .map(normalize_file_type)
      .filter(|t| !t.is_empty())
      .map(|t| Filter::equals(PayloadField::FileType, t));

    let hits = self
      .store()
      .search(&project.collection(), &vector, params.limit, filter.as_ref())
      .await?;

    debug!(
      project = %project.name(),
      query_len = query.len(),
      file_type = ?params.file_type,
      hits = hits.len(),
      "Code search complete"
    );
    Ok(hits)
  }
}
