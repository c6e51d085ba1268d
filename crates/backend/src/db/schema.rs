use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Schema for a collection of chunk vectors
pub fn chunk_vectors_schema(vector_dim: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("file_path", DataType::Utf8, false), // Absolute, forward slashes
    Field::new("file_name", DataType::Utf8, false),
    Field::new("file_type", DataType::Utf8, false), // Lowercased extension, may be empty
    Field::new("project", DataType::Utf8, false),
    Field::new("line_start", DataType::UInt32, false),
    Field::new("line_end", DataType::UInt32, false),
    Field::new("chunk_index", DataType::UInt32, false),
    Field::new("total_chunks", DataType::UInt32, false),
    Field::new("updated_at", DataType::Int64, false), // Unix timestamp ms
    Field::new("content", DataType::Utf8, false),
    Field::new(
      "vector",
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), vector_dim as i32),
      false,
    ),
  ]))
}
