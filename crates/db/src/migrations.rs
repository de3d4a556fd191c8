//! Schema-version bookkeeping for the `_schema_meta` table.
//!
//! LanceDB has no notion of an application-level migration log, so this
//! crate keeps its own single-row table recording the schema version and
//! vector dimensionality the store was last opened with. [`VectorStore::open_at_path`]
//! compares that row against [`CURRENT_SCHEMA_VERSION`]/the requested dimension
//! on every open; a mismatch means stored vectors can't be trusted, so
//! `chunks` is wiped while `file_status` survives for the reconciler to replay
//! against.

use arrow_array::{Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use std::sync::Arc;
use tracing::debug;

use crate::connection::{Result, VectorStore};
use crate::schema::schema_meta_schema;

/// Bump when the on-disk layout of `chunks`/`file_status` changes in a way
/// that isn't just a vector-dimension change (e.g. an added column with no
/// default). A bump here wipes `chunks` exactly like a dimension mismatch.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy)]
pub struct SchemaMeta {
  pub version: i64,
  pub vector_dim: i64,
}

/// Reads the single row of `_schema_meta`, if present.
pub async fn read_schema_meta(store: &VectorStore) -> Result<Option<SchemaMeta>> {
  let table = store.schema_meta_table().await?;
  let batches: Vec<RecordBatch> = table.query().execute().await?.try_collect().await?;

  for batch in batches {
    if batch.num_rows() == 0 {
      continue;
    }
    let versions = batch
      .column_by_name("version")
      .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
      .expect("_schema_meta.version is Int64");
    let dims = batch
      .column_by_name("vector_dim")
      .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
      .expect("_schema_meta.vector_dim is Int64");
    return Ok(Some(SchemaMeta {
      version: versions.value(0),
      vector_dim: dims.value(0),
    }));
  }

  Ok(None)
}

/// Overwrites `_schema_meta` with the current version and the store's
/// configured dimensionality. There is always exactly one row.
pub async fn write_schema_meta(store: &VectorStore) -> Result<()> {
  let table = store.schema_meta_table().await?;
  table.delete("true").await?;

  let schema = schema_meta_schema();
  let batch = RecordBatch::try_new(
    schema.clone(),
    vec![
      Arc::new(Int64Array::from(vec![CURRENT_SCHEMA_VERSION])),
      Arc::new(Int64Array::from(vec![store.vector_dim as i64])),
      Arc::new(StringArray::from(vec![Utc::now().to_rfc3339()])),
    ],
  )?;
  let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
  table.add(Box::new(batches)).execute().await?;
  Ok(())
}

/// Drops and recreates `chunks` empty, at the store's current dimension.
/// `file_status` is untouched — the reconciler re-enqueues every row it
/// still has on the next scan.
pub async fn wipe_chunks(store: &VectorStore) -> Result<()> {
  debug!(path = %store.path.display(), "wiping chunks table for schema/dim change");
  store.connection.drop_table("chunks").await.ok();
  store
    .connection
    .create_empty_table("chunks", crate::schema::chunks_schema(store.vector_dim))
    .execute()
    .await?;
  Ok(())
}
