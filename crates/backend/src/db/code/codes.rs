// Chunk vector table operations

use std::sync::Arc;

use arrow_array::{
  Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::{
  DistanceType,
  query::{ExecutableQuery, QueryBase},
};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
  db::{
    Filter, VectorStore,
    connection::{DbError, LanceStore, Result},
    schema::chunk_vectors_schema,
  },
  domain::code::{IndexedVector, ScoredPoint, StoredPoint, VectorPayload},
};

#[async_trait]
impl VectorStore for LanceStore {
  fn name(&self) -> &str {
    "lancedb"
  }

  async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
    self.ensure_table(collection, dimensions).await
  }

  /// Batch insert. Ids are fresh per write, so this never collides with
  /// existing rows; callers delete the file's previous vectors first.
  #[tracing::instrument(level = "trace", skip(self, points), fields(batch_size = points.len()))]
  async fn upsert(&self, collection: &str, points: Vec<IndexedVector>) -> Result<()> {
    if points.is_empty() {
      return Ok(());
    }

    let table = self
      .table(collection)
      .await?
      .ok_or_else(|| DbError::NotFound(format!("collection {}", collection)))?;
    let vector_dim = Self::table_dimensions(&table).await?;

    if let Some(bad) = points.iter().find(|p| p.vector.len() != vector_dim) {
      return Err(DbError::DimensionMismatch {
        collection: collection.to_string(),
        expected: vector_dim,
        actual: bad.vector.len(),
      });
    }

    trace!(
      collection = %collection,
      operation = "batch_insert",
      batch_size = points.len(),
      "Adding chunk vectors"
    );

    let batch = points_to_batch(&points, vector_dim)?;
    let iter = RecordBatchIterator::new(vec![Ok(batch)], chunk_vectors_schema(vector_dim));
    table.add(Box::new(iter)).execute().await?;
    Ok(())
  }

  async fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<()> {
    let Some(table) = self.table(collection).await? else {
      return Ok(());
    };

    let predicate = filter.to_sql();
    debug!(collection = %collection, operation = "delete", predicate = %predicate, "Deleting chunk vectors");
    table.delete(&predicate).await?;
    Ok(())
  }

  async fn search(
    &self,
    collection: &str,
    vector: &[f32],
    limit: usize,
    filter: Option<&Filter>,
  ) -> Result<Vec<ScoredPoint>> {
    debug!(
      collection = %collection,
      operation = "search",
      query_len = vector.len(),
      limit = limit,
      has_filter = filter.is_some(),
      "Searching chunk vectors"
    );

    let Some(table) = self.table(collection).await? else {
      return Ok(Vec::new());
    };

    let query = table
      .vector_search(vector.to_vec())?
      .distance_type(DistanceType::Cosine)
      .limit(limit);
    let query = match filter {
      Some(f) => query.only_if(f.to_sql()),
      None => query,
    };

    let results: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

    let mut hits = Vec::new();
    for batch in results {
      for i in 0..batch.num_rows() {
        let (id, payload) = batch_to_point(&batch, i)?;
        let distance = batch
          .column_by_name("_distance")
          .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
          .map(|arr| arr.value(i))
          .unwrap_or(1.0);
        hits.push(ScoredPoint {
          id,
          score: 1.0 - distance,
          payload,
        });
      }
    }

    debug!(collection = %collection, operation = "search", results = hits.len(), "Search complete");
    Ok(hits)
  }

  #[tracing::instrument(level = "trace", skip(self, filter), fields(has_filter = filter.is_some(), limit = ?limit))]
  async fn scroll(&self, collection: &str, filter: Option<&Filter>, limit: Option<usize>) -> Result<Vec<StoredPoint>> {
    let Some(table) = self.table(collection).await? else {
      return Ok(Vec::new());
    };

    let query = match (filter, limit) {
      (Some(f), Some(l)) => table.query().only_if(f.to_sql()).limit(l),
      (Some(f), None) => table.query().only_if(f.to_sql()),
      (None, Some(l)) => table.query().limit(l),
      (None, None) => table.query(),
    };

    let results: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

    let mut points = Vec::new();
    for batch in results {
      for i in 0..batch.num_rows() {
        let (id, payload) = batch_to_point(&batch, i)?;
        points.push(StoredPoint { id, payload });
      }
    }

    Ok(points)
  }
}

/// Convert points to a single Arrow RecordBatch
fn points_to_batch(points: &[IndexedVector], vector_dim: usize) -> Result<RecordBatch> {
  let ids: Vec<String> = points.iter().map(|p| p.id.to_string()).collect();
  let file_paths: Vec<&str> = points.iter().map(|p| p.payload.file_path.as_str()).collect();
  let file_names: Vec<&str> = points.iter().map(|p| p.payload.file_name.as_str()).collect();
  let file_types: Vec<&str> = points.iter().map(|p| p.payload.file_type.as_str()).collect();
  let projects: Vec<&str> = points.iter().map(|p| p.payload.project.as_str()).collect();
  let line_starts: Vec<u32> = points.iter().map(|p| p.payload.line_start).collect();
  let line_ends: Vec<u32> = points.iter().map(|p| p.payload.line_end).collect();
  let chunk_indexes: Vec<u32> = points.iter().map(|p| p.payload.chunk_index).collect();
  let totals: Vec<u32> = points.iter().map(|p| p.payload.total_chunks).collect();
  let updated_ats: Vec<i64> = points.iter().map(|p| p.payload.updated_at.timestamp_millis()).collect();
  let contents: Vec<&str> = points.iter().map(|p| p.payload.content.as_str()).collect();

  let all_vectors: Vec<f32> = points.iter().flat_map(|p| p.vector.iter().copied()).collect();
  let vector_values = Float32Array::from(all_vectors);
  let field = Arc::new(arrow_schema::Field::new("item", arrow_schema::DataType::Float32, true));
  let vector_list = FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(vector_values), None)?;

  let batch = RecordBatch::try_new(
    chunk_vectors_schema(vector_dim),
    vec![
      Arc::new(StringArray::from(ids)),
      Arc::new(StringArray::from(file_paths)),
      Arc::new(StringArray::from(file_names)),
      Arc::new(StringArray::from(file_types)),
      Arc::new(StringArray::from(projects)),
      Arc::new(UInt32Array::from(line_starts)),
      Arc::new(UInt32Array::from(line_ends)),
      Arc::new(UInt32Array::from(chunk_indexes)),
      Arc::new(UInt32Array::from(totals)),
      Arc::new(Int64Array::from(updated_ats)),
      Arc::new(StringArray::from(contents)),
      Arc::new(vector_list),
    ],
  )?;

  Ok(batch)
}

/// Convert a RecordBatch row to an id and payload
fn batch_to_point(batch: &RecordBatch, row: usize) -> Result<(Uuid, VectorPayload)> {
  let get_string = |name: &str| -> Result<String> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<StringArray>())
      .map(|a| a.value(row).to_string())
      .ok_or_else(|| DbError::NotFound(format!("column {}", name)))
  };

  let get_u32 = |name: &str| -> Result<u32> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {}", name)))
  };

  let get_i64 = |name: &str| -> Result<i64> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {}", name)))
  };

  let id = Uuid::parse_str(&get_string("id")?).map_err(|_| DbError::NotFound("invalid id".into()))?;
  let updated_at = Utc
    .timestamp_millis_opt(get_i64("updated_at")?)
    .single()
    .ok_or_else(|| DbError::NotFound("invalid updated_at timestamp".into()))?;

  let payload = VectorPayload {
    file_path: get_string("file_path")?,
    file_name: get_string("file_name")?,
    file_type: get_string("file_type")?,
    line_start: get_u32("line_start")?,
    line_end: get_u32("line_end")?,
    project: get_string("project")?,
    chunk_index: get_u32("chunk_index")?,
    total_chunks: get_u32("total_chunks")?,
    updated_at,
    content: get_string("content")?,
  };

  Ok((id, payload))
}
