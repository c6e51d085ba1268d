use std::{collections::HashMap, path::Path, time::Duration};

use arrow_schema::DataType;
use lancedb::{Connection, Table, connect};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::db::schema::chunk_vectors_schema;

#[derive(Error, Debug)]
pub enum DbError {
  #[error("LanceDB error: {0}")]
  Lance(#[from] lancedb::Error),
  #[error("Arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Not found: {0}")]
  NotFound(String),
  #[error("Invalid input: {0}")]
  InvalidInput(String),
  #[error("Database query error: {0}")]
  Query(String),
  #[error("Collection '{collection}' stores {expected}-dimensional vectors, got {actual}")]
  DimensionMismatch {
    collection: String,
    expected: usize,
    actual: usize,
  },
}

pub type Result<T> = std::result::Result<T, DbError>;

/// LanceDB-backed store. One table per collection.
///
/// Opened tables are cached for the life of the store. Table creation runs
/// under the cache's write lock, so concurrent first writers create a
/// collection once.
pub struct LanceStore {
  pub connection: Connection,
  tables: RwLock<HashMap<String, Table>>,
}

impl LanceStore {
  /// Open or create the database at `uri`
  pub async fn open(uri: &str) -> Result<Self> {
    let path = Path::new(uri);
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }

    info!(uri = %uri, "Opening vector store");
    // cached handles must still see writes from other processes
    let connection = match connect(uri).read_consistency_interval(Duration::ZERO).execute().await {
      Ok(conn) => {
        debug!(uri = %uri, "Vector store connection established");
        conn
      }
      Err(e) => {
        error!(uri = %uri, err = %e, "Failed to connect to vector store");
        return Err(e.into());
      }
    };

    Ok(Self {
      connection,
      tables: RwLock::new(HashMap::new()),
    })
  }

  pub(crate) async fn has_table(&self, collection: &str) -> Result<bool> {
    let names = self.connection.table_names().execute().await?;
    Ok(names.iter().any(|n| n == collection))
  }

  /// Open `collection` if it exists. Caller holds the cache's write lock.
  async fn open_uncached(&self, tables: &mut HashMap<String, Table>, collection: &str) -> Result<Option<Table>> {
    if let Some(table) = tables.get(collection) {
      return Ok(Some(table.clone()));
    }
    if !self.has_table(collection).await? {
      return Ok(None);
    }
    let table = self.connection.open_table(collection).execute().await?;
    tables.insert(collection.to_string(), table.clone());
    Ok(Some(table))
  }

  /// Open the table, or `None` when it was never created
  pub(crate) async fn table(&self, collection: &str) -> Result<Option<Table>> {
    if let Some(table) = self.tables.read().await.get(collection) {
      return Ok(Some(table.clone()));
    }
    let mut tables = self.tables.write().await;
    self.open_uncached(&mut tables, collection).await
  }

  /// Vector width of an existing table
  pub(crate) async fn table_dimensions(table: &Table) -> Result<usize> {
    let schema = table.schema().await?;
    let field = schema
      .field_with_name("vector")
      .map_err(|_| DbError::NotFound(format!("vector column in {}", table.name())))?;

    match field.data_type() {
      DataType::FixedSizeList(_, size) => Ok(*size as usize),
      other => Err(DbError::Query(format!("unexpected vector column type {other}"))),
    }
  }

  async fn check_dimensions(table: &Table, collection: &str, dimensions: usize) -> Result<()> {
    let existing = Self::table_dimensions(table).await?;
    if existing != dimensions {
      return Err(DbError::DimensionMismatch {
        collection: collection.to_string(),
        expected: existing,
        actual: dimensions,
      });
    }
    Ok(())
  }

  pub(crate) async fn ensure_table(&self, collection: &str, dimensions: usize) -> Result<()> {
    if let Some(table) = self.tables.read().await.get(collection).cloned() {
      return Self::check_dimensions(&table, collection, dimensions).await;
    }

    let mut tables = self.tables.write().await;
    if let Some(table) = self.open_uncached(&mut tables, collection).await? {
      return Self::check_dimensions(&table, collection, dimensions).await;
    }

    debug!(collection = %collection, dimensions, "Creating collection");
    let created = self
      .connection
      .create_empty_table(collection, chunk_vectors_schema(dimensions))
      .execute()
      .await;

    let table = match created {
      Ok(table) => table,
      // another process got there first
      Err(lancedb::Error::TableAlreadyExists { .. }) => {
        let table = self.connection.open_table(collection).execute().await?;
        Self::check_dimensions(&table, collection, dimensions).await?;
        table
      }
      Err(e) => return Err(e.into()),
    };
    tables.insert(collection.to_string(), table);
    Ok(())
  }
}
