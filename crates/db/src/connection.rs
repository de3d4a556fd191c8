use lancedb::{Connection, connect};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::schema::{DEFAULT_VECTOR_DIM, chunks_schema, file_status_schema, schema_meta_schema};

#[derive(Error, Debug)]
pub enum DbError {
  #[error("LanceDB error: {0}")]
  Lance(#[from] lancedb::Error),
  #[error("Arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// LanceDB-backed store for chunk rows and per-file indexing status.
///
/// Unlike a per-project database, there is exactly one `VectorStore` per
/// daemon instance: it owns the single global index over all watched
/// folders.
pub struct VectorStore {
  pub path: PathBuf,
  pub connection: Connection,
  pub vector_dim: usize,
  /// Set when opening this store found a schema-version or
  /// vector-dimension mismatch and wiped `chunks` in response. The
  /// Orchestrator checks this after open and, if set, re-enqueues every
  /// row still present in `file_status`.
  pub schema_wiped: bool,
}

impl VectorStore {
  pub async fn open(base_path: &std::path::Path) -> Result<Self> {
    Self::open_at_path(base_path.join("lancedb"), DEFAULT_VECTOR_DIM).await
  }

  pub async fn open_at_path(db_path: PathBuf, vector_dim: usize) -> Result<Self> {
    if let Some(parent) = db_path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    info!(path = %db_path.display(), "opening vector store");
    let connection = connect(db_path.to_string_lossy().as_ref()).execute().await?;

    let mut store = Self { path: db_path, connection, vector_dim, schema_wiped: false };

    store.ensure_tables().await?;
    store.schema_wiped = store.reconcile_schema_version().await?;

    Ok(store)
  }

  async fn ensure_tables(&self) -> Result<()> {
    let table_names = self.connection.table_names().execute().await?;

    if !table_names.contains(&"chunks".to_string()) {
      debug!("creating chunks table");
      self
        .connection
        .create_empty_table("chunks", chunks_schema(self.vector_dim))
        .execute()
        .await?;
    }

    if !table_names.contains(&"file_status".to_string()) {
      debug!("creating file_status table");
      self
        .connection
        .create_empty_table("file_status", file_status_schema())
        .execute()
        .await?;
    }

    if !table_names.contains(&"_schema_meta".to_string()) {
      debug!("creating _schema_meta table");
      self
        .connection
        .create_empty_table("_schema_meta", schema_meta_schema())
        .execute()
        .await?;
    }

    Ok(())
  }

  /// Compares the stored schema version and vector dimensionality against
  /// what this build expects. A mismatch on either axis means existing
  /// vectors can't be trusted (a dimension change invalidates every row's
  /// `vector` column), so `chunks` is dropped and recreated empty while
  /// `file_status` is left intact for the reconciler to replay. Returns
  /// whether a wipe happened.
  async fn reconcile_schema_version(&self) -> Result<bool> {
    use crate::migrations::{CURRENT_SCHEMA_VERSION, read_schema_meta, wipe_chunks, write_schema_meta};

    match read_schema_meta(self).await? {
      Some(meta) if meta.version == CURRENT_SCHEMA_VERSION && meta.vector_dim as usize == self.vector_dim => Ok(false),
      Some(meta) => {
        warn!(
          stored_version = meta.version,
          stored_dim = meta.vector_dim,
          expected_version = CURRENT_SCHEMA_VERSION,
          expected_dim = self.vector_dim,
          "schema mismatch, wiping chunks table"
        );
        wipe_chunks(self).await?;
        write_schema_meta(self).await?;
        Ok(true)
      }
      None => {
        write_schema_meta(self).await?;
        Ok(false)
      }
    }
  }

  pub async fn chunks_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table("chunks").execute().await?)
  }

  pub async fn file_status_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table("file_status").execute().await?)
  }

  pub async fn schema_meta_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table("_schema_meta").execute().await?)
  }
}

/// Resolves the daemon's base data directory, honoring the
/// `INDEXER_DATA_DIR` override before falling back to the platform data
/// directory.
pub fn default_data_dir() -> PathBuf {
  indexer_core::paths::default_data_dir()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  async fn open_test_store(dim: usize) -> (TempDir, VectorStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = VectorStore::open_at_path(temp_dir.path().join("test.lancedb"), dim).await.unwrap();
    (temp_dir, store)
  }

  #[tokio::test]
  async fn opening_creates_all_three_tables() {
    let (_temp, store) = open_test_store(8).await;
    let names = store.connection.table_names().execute().await.unwrap();
    assert!(names.contains(&"chunks".to_string()));
    assert!(names.contains(&"file_status".to_string()));
    assert!(names.contains(&"_schema_meta".to_string()));
  }

  #[tokio::test]
  async fn first_open_is_not_reported_as_a_wipe() {
    let (_temp, store) = open_test_store(8).await;
    assert!(!store.schema_wiped);
  }

  #[tokio::test]
  async fn reopening_with_same_dim_is_not_a_wipe() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.lancedb");
    VectorStore::open_at_path(path.clone(), 8).await.unwrap();
    let reopened = VectorStore::open_at_path(path, 8).await.unwrap();
    assert!(!reopened.schema_wiped);
  }

  #[tokio::test]
  async fn reopening_with_different_dim_reports_a_wipe() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.lancedb");
    VectorStore::open_at_path(path.clone(), 8).await.unwrap();
    let reopened = VectorStore::open_at_path(path, 16).await.unwrap();
    assert!(reopened.schema_wiped);
  }
}
