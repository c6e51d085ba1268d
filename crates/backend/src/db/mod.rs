//! Vector store gateway
//!
//! The [`VectorStore`] trait is the only way the pipeline touches persisted
//! vectors. Each project maps to one collection. Point ids are opaque and
//! regenerated on every write, so deletion always goes through a payload
//! [`Filter`] (usually on `file_path`).
//!
//! Operations against a collection that does not exist yet are treated as
//! empty: deletes are no-ops and searches return nothing.

mod connection;
mod memory;
mod schema;

pub mod code;
pub mod filter;

use std::sync::Arc;

use async_trait::async_trait;
pub use connection::{DbError, LanceStore, Result};
pub use filter::{Filter, PayloadField};
pub use memory::MemoryStore;
use tracing::info;

use crate::domain::{
  code::{IndexedVector, ScoredPoint, StoredPoint},
  config::{StoreBackend, StoreConfig},
};

#[async_trait]
pub trait VectorStore: Send + Sync {
  fn name(&self) -> &str;

  /// Create the collection if missing. Fails with
  /// [`DbError::DimensionMismatch`] when it exists with another vector size.
  async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()>;

  async fn upsert(&self, collection: &str, points: Vec<IndexedVector>) -> Result<()>;

  async fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<()>;

  async fn search(
    &self,
    collection: &str,
    vector: &[f32],
    limit: usize,
    filter: Option<&Filter>,
  ) -> Result<Vec<ScoredPoint>>;

  /// Payloads without vectors
  async fn scroll(&self, collection: &str, filter: Option<&Filter>, limit: Option<usize>) -> Result<Vec<StoredPoint>>;
}

impl dyn VectorStore {
  pub async fn from_config(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
      StoreBackend::LanceDb => {
        let uri = config.resolved_uri();
        let store = LanceStore::open(&uri).await?;
        Ok(Arc::new(store))
      }
      StoreBackend::Memory => {
        info!("Using in-memory vector store, nothing will be persisted");
        Ok(Arc::new(MemoryStore::new()))
      }
    }
  }
}
