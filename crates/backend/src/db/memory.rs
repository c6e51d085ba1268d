//! Process-local [`VectorStore`] used for tests and the `memory` backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
  db::{
    Filter, VectorStore,
    connection::{DbError, Result},
  },
  domain::code::{IndexedVector, ScoredPoint, StoredPoint},
};

struct Collection {
  dimensions: usize,
  points: Vec<IndexedVector>,
}

#[derive(Default)]
pub struct MemoryStore {
  collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of points in a collection, 0 when missing
  pub fn len(&self, collection: &str) -> usize {
    self.collections.read().get(collection).map(|c| c.points.len()).unwrap_or(0)
  }

  pub fn is_empty(&self, collection: &str) -> bool {
    self.len(collection) == 0
  }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }
  dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryStore {
  fn name(&self) -> &str {
    "memory"
  }

  async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
    let mut collections = self.collections.write();
    match collections.get(collection) {
      Some(existing) if existing.dimensions != dimensions => Err(DbError::DimensionMismatch {
        collection: collection.to_string(),
        expected: existing.dimensions,
        actual: dimensions,
      }),
      Some(_) => Ok(()),
      None => {
        collections.insert(
          collection.to_string(),
          Collection {
            dimensions,
            points: Vec::new(),
          },
        );
        Ok(())
      }
    }
  }

  async fn upsert(&self, collection: &str, points: Vec<IndexedVector>) -> Result<()> {
    let mut collections = self.collections.write();
    let target = collections
      .get_mut(collection)
      .ok_or_else(|| DbError::NotFound(format!("collection {}", collection)))?;

    if let Some(bad) = points.iter().find(|p| p.vector.len() != target.dimensions) {
      return Err(DbError::DimensionMismatch {
        collection: collection.to_string(),
        expected: target.dimensions,
        actual: bad.vector.len(),
      });
    }

    for point in points {
      target.points.retain(|p| p.id != point.id);
      target.points.push(point);
    }
    Ok(())
  }

  async fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<()> {
    if let Some(target) = self.collections.write().get_mut(collection) {
      target.points.retain(|p| !filter.matches(&p.payload));
    }
    Ok(())
  }

  async fn search(
    &self,
    collection: &str,
    vector: &[f32],
    limit: usize,
    filter: Option<&Filter>,
  ) -> Result<Vec<ScoredPoint>> {
    let collections = self.collections.read();
    let Some(target) = collections.get(collection) else {
      return Ok(Vec::new());
    };

    let mut hits: Vec<ScoredPoint> = target
      .points
      .iter()
      .filter(|p| filter.is_none_or(|f| f.matches(&p.payload)))
      .map(|p| ScoredPoint {
        id: p.id,
        score: cosine_similarity(vector, &p.vector),
        payload: p.payload.clone(),
      })
      .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    Ok(hits)
  }

  async fn scroll(&self, collection: &str, filter: Option<&Filter>, limit: Option<usize>) -> Result<Vec<StoredPoint>> {
    let collections = self.collections.read();
    let Some(target) = collections.get(collection) else {
      return Ok(Vec::new());
    };

    Ok(
      target
        .points
        .iter()
        .filter(|p| filter.is_none_or(|f| f.matches(&p.payload)))
        .take(limit.unwrap_or(usize::MAX))
        .map(|p| StoredPoint {
          id: p.id,
          payload: p.payload.clone(),
        })
        .collect(),
    )
  }
}
