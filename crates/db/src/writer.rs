//! Vector Store Writer: a single in-process write queue serializing every
//! mutation of the `chunks` table, plus the read-side search/count helpers
//! the Query Service calls directly (reads need no serialization).

use arrow_array::{FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::DataType;
use futures::TryStreamExt;
use indexer_core::ChunkRow;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::connection::{DbError, Result, VectorStore};
use crate::schema::chunks_schema;

/// Row count above which [`maybe_build_ann_index`] opportunistically
/// builds an ANN index. A failure there is logged, not propagated.
pub const ANN_INDEX_ROW_THRESHOLD: usize = 50_000;

enum WriteCommand {
  UpsertChunks { rows: Vec<ChunkRow>, reply: oneshot::Sender<Result<()>> },
  DeleteByPath { path: String, reply: oneshot::Sender<Result<()>> },
  DeleteStaleChunks { path: String, keep_ids: Vec<String>, reply: oneshot::Sender<Result<()>> },
  CreateAnnIndex { reply: oneshot::Sender<Result<()>> },
}

/// A single-task actor owning all writes to the `chunks` table. Cloning is
/// cheap (it's a channel handle); every clone serializes through the same
/// background task.
#[derive(Clone)]
pub struct VectorStoreWriter {
  tx: mpsc::Sender<WriteCommand>,
}

impl VectorStoreWriter {
  /// Spawns the writer task. `store` is moved into the task; readers keep
  /// their own `Arc<VectorStore>` for the concurrent-safe read path.
  pub fn spawn(store: Arc<VectorStore>) -> Self {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(run(store, rx));
    Self { tx }
  }

  /// Merge-upsert by `id`: existing rows with matching ids are replaced,
  /// new ones inserted. LanceDB has no row update, so this is
  /// delete-then-insert under the hood.
  pub async fn upsert_chunks(&self, rows: Vec<ChunkRow>) -> Result<()> {
    if rows.is_empty() {
      return Ok(());
    }
    let (reply, recv) = oneshot::channel();
    self
      .tx
      .send(WriteCommand::UpsertChunks { rows, reply })
      .await
      .map_err(|_| writer_stopped())?;
    recv.await.map_err(|_| writer_stopped())?
  }

  pub async fn delete_by_path(&self, path: &str) -> Result<()> {
    let (reply, recv) = oneshot::channel();
    self
      .tx
      .send(WriteCommand::DeleteByPath { path: path.to_string(), reply })
      .await
      .map_err(|_| writer_stopped())?;
    recv.await.map_err(|_| writer_stopped())?
  }

  /// Deletes every chunk row for `path` whose `id` is not in `keep_ids` —
  /// the orphaned remainder once a re-index's chunk boundaries no longer
  /// cover every id the previous version wrote (the file shrank, or text
  /// shifted so a page/offset pair stopped existing). Callers must only
  /// invoke this once `keep_ids`' rows are themselves already written, so a
  /// file never passes through a state with no chunks at all for an id that
  /// still belongs to it.
  pub async fn delete_stale_chunks(&self, path: &str, keep_ids: Vec<String>) -> Result<()> {
    let (reply, recv) = oneshot::channel();
    self
      .tx
      .send(WriteCommand::DeleteStaleChunks { path: path.to_string(), keep_ids, reply })
      .await
      .map_err(|_| writer_stopped())?;
    recv.await.map_err(|_| writer_stopped())?
  }

  pub async fn create_ann_index(&self) -> Result<()> {
    let (reply, recv) = oneshot::channel();
    self.tx.send(WriteCommand::CreateAnnIndex { reply }).await.map_err(|_| writer_stopped())?;
    recv.await.map_err(|_| writer_stopped())?
  }
}

fn writer_stopped() -> DbError {
  DbError::NotFound("vector store writer task is no longer running".into())
}

async fn run(store: Arc<VectorStore>, mut rx: mpsc::Receiver<WriteCommand>) {
  while let Some(cmd) = rx.recv().await {
    match cmd {
      WriteCommand::UpsertChunks { rows, reply } => {
        let result = with_conflict_retry(|| upsert_chunks_once(&store, &rows)).await;
        let _ = reply.send(result);
      }
      WriteCommand::DeleteByPath { path, reply } => {
        let result = with_conflict_retry(|| delete_by_path_once(&store, &path)).await;
        let _ = reply.send(result);
      }
      WriteCommand::DeleteStaleChunks { path, keep_ids, reply } => {
        let result = with_conflict_retry(|| delete_stale_chunks_once(&store, &path, &keep_ids)).await;
        let _ = reply.send(result);
      }
      WriteCommand::CreateAnnIndex { reply } => {
        let result = create_ann_index_once(&store).await;
        let _ = reply.send(result);
      }
    }
  }
  debug!("vector store writer task exiting (channel closed)");
}

/// Runs `op` once, and on a LanceDB commit-conflict error, sleeps briefly
/// and retries exactly once more. A second conflict surfaces as fatal.
async fn with_conflict_retry<F, Fut>(op: F) -> Result<()>
where
  F: Fn() -> Fut,
  Fut: std::future::Future<Output = Result<()>>,
{
  match op().await {
    Ok(()) => Ok(()),
    Err(err) if is_commit_conflict(&err) => {
      warn!(error = %err, "commit conflict, retrying once");
      tokio::time::sleep(Duration::from_millis(50)).await;
      op().await
    }
    Err(err) => Err(err),
  }
}

fn is_commit_conflict(err: &DbError) -> bool {
  matches!(err, DbError::Lance(_)) && err.to_string().to_lowercase().contains("commit")
}

async fn upsert_chunks_once(store: &VectorStore, rows: &[ChunkRow]) -> Result<()> {
  let table = store.chunks_table().await?;

  let id_list = rows.iter().map(|r| format!("'{}'", escape(&r.id))).collect::<Vec<_>>().join(", ");
  table.delete(&format!("id IN ({id_list})")).await?;

  let schema = chunks_schema(store.vector_dim);
  let batch = chunk_rows_to_batch(rows, store.vector_dim)?;
  let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
  table.add(Box::new(batches)).execute().await?;
  Ok(())
}

async fn delete_by_path_once(store: &VectorStore, path: &str) -> Result<()> {
  let table = store.chunks_table().await?;
  table.delete(&format!("path = '{}'", escape(path))).await?;
  Ok(())
}

async fn delete_stale_chunks_once(store: &VectorStore, path: &str, keep_ids: &[String]) -> Result<()> {
  let table = store.chunks_table().await?;
  let predicate = if keep_ids.is_empty() {
    format!("path = '{}'", escape(path))
  } else {
    let id_list = keep_ids.iter().map(|id| format!("'{}'", escape(id))).collect::<Vec<_>>().join(", ");
    format!("path = '{}' AND id NOT IN ({id_list})", escape(path))
  };
  table.delete(&predicate).await?;
  Ok(())
}

async fn create_ann_index_once(store: &VectorStore) -> Result<()> {
  let table = store.chunks_table().await?;
  match table.create_index(&["vector"], Index::Auto).execute().await {
    Ok(()) => Ok(()),
    Err(err) => {
      error!(error = %err, "failed to build ANN index, continuing without it");
      Ok(())
    }
  }
}

/// Builds an ANN index if the table has grown past [`ANN_INDEX_ROW_THRESHOLD`].
/// Failure is logged and swallowed — search still works via a flat scan.
pub async fn maybe_build_ann_index(writer: &VectorStoreWriter, store: &VectorStore) -> Result<()> {
  if count(store).await? > ANN_INDEX_ROW_THRESHOLD {
    writer.create_ann_index().await?;
  }
  Ok(())
}

fn escape(s: &str) -> String {
  s.replace('\'', "''")
}

fn chunk_rows_to_batch(rows: &[ChunkRow], vector_dim: usize) -> Result<RecordBatch> {
  let schema = chunks_schema(vector_dim);

  let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
  let paths: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
  let mtimes: Vec<i64> = rows.iter().map(|r| r.mtime).collect();
  let pages: Vec<i64> = rows.iter().map(|r| r.page).collect();
  let offsets: Vec<i64> = rows.iter().map(|r| r.offset).collect();
  let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
  let types: Vec<&str> = rows.iter().map(|r| r.r#type.as_str()).collect();
  let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();

  let mut flat = Vec::with_capacity(rows.len() * vector_dim);
  for row in rows {
    let vector = row.vector.as_ref().ok_or_else(|| {
      DbError::NotFound(format!("chunk {} has no vector; the embedding queue must fill it in before writing", row.id))
    })?;
    if vector.len() != vector_dim {
      return Err(DbError::NotFound(format!(
        "chunk {} has a {}-dim vector, store expects {vector_dim}",
        row.id,
        vector.len()
      )));
    }
    flat.extend(vector.iter().copied().map(Some));
  }
  let values = Float32Array::from(flat);
  let vector_field = match schema.field_with_name("vector")?.data_type() {
    DataType::FixedSizeList(f, _) => f.clone(),
    other => unreachable!("chunks.vector must be a FixedSizeList, got {other:?}"),
  };
  let vectors = FixedSizeListArray::new(vector_field, vector_dim as i32, Arc::new(values), None);

  Ok(RecordBatch::try_new(
    schema,
    vec![
      Arc::new(StringArray::from(ids)),
      Arc::new(StringArray::from(paths)),
      Arc::new(Int64Array::from(mtimes)),
      Arc::new(Int64Array::from(pages)),
      Arc::new(Int64Array::from(offsets)),
      Arc::new(StringArray::from(texts)),
      Arc::new(StringArray::from(types)),
      Arc::new(StringArray::from(titles)),
      Arc::new(vectors),
    ],
  )?)
}

/// A ranked search result, with `score` already converted from raw
/// distance via `max(0, 1 - d/2)`, bounded in `[0,1]`.
#[derive(Debug, Clone)]
pub struct SearchHit {
  pub id: String,
  pub path: String,
  pub page: i64,
  pub offset: i64,
  pub text: String,
  pub title: String,
  pub score: f32,
}

/// ANN search over `chunks`. Safe to call concurrently with writes — reads
/// never go through the write queue.
pub async fn search(store: &VectorStore, vector: Vec<f32>, k: usize) -> Result<Vec<SearchHit>> {
  let table = store.chunks_table().await?;
  let batches: Vec<RecordBatch> = table.vector_search(vector)?.limit(k).execute().await?.try_collect().await?;

  let mut hits = Vec::new();
  for batch in &batches {
    let ids = str_col(batch, "id");
    let paths = str_col(batch, "path");
    let pages = i64_col(batch, "page");
    let offsets = i64_col(batch, "offset");
    let texts = str_col(batch, "text");
    let titles = str_col(batch, "title");
    let distances = batch
      .column_by_name("_distance")
      .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
      .expect("vector_search results carry a _distance column");

    for i in 0..batch.num_rows() {
      let distance = distances.value(i);
      let score = (1.0 - distance / 2.0).clamp(0.0, 1.0);
      hits.push(SearchHit {
        id: ids.value(i).to_string(),
        path: paths.value(i).to_string(),
        page: pages.value(i),
        offset: offsets.value(i),
        text: texts.value(i).to_string(),
        title: titles.value(i).to_string(),
        score,
      });
    }
  }

  hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
  Ok(hits)
}

pub async fn count(store: &VectorStore) -> Result<usize> {
  let table = store.chunks_table().await?;
  Ok(table.count_rows(None).await?)
}

fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    .unwrap_or_else(|| panic!("chunks.{name} is Utf8"))
}

fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> &'a Int64Array {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
    .unwrap_or_else(|| panic!("chunks.{name} is Int64"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn row(id_seed: &str, vector: Vec<f32>) -> ChunkRow {
    let mut row = ChunkRow::new("/docs/a.txt", 1000, 0, 0, format!("text for {id_seed}"), "txt");
    row.id = id_seed.to_string();
    row.vector = Some(vector);
    row
  }

  #[tokio::test]
  async fn upsert_then_count() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open_at_path(dir.path().join("t.lancedb"), 4).await.unwrap());
    let writer = VectorStoreWriter::spawn(store.clone());

    writer.upsert_chunks(vec![row("a", vec![1.0, 0.0, 0.0, 0.0]), row("b", vec![0.0, 1.0, 0.0, 0.0])]).await.unwrap();
    assert_eq!(count(&store).await.unwrap(), 2);
  }

  #[tokio::test]
  async fn upsert_with_same_id_replaces_not_duplicates() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open_at_path(dir.path().join("t.lancedb"), 4).await.unwrap());
    let writer = VectorStoreWriter::spawn(store.clone());

    writer.upsert_chunks(vec![row("a", vec![1.0, 0.0, 0.0, 0.0])]).await.unwrap();
    writer.upsert_chunks(vec![row("a", vec![0.0, 0.0, 1.0, 0.0])]).await.unwrap();
    assert_eq!(count(&store).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn delete_by_path_removes_its_rows() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open_at_path(dir.path().join("t.lancedb"), 4).await.unwrap());
    let writer = VectorStoreWriter::spawn(store.clone());

    writer.upsert_chunks(vec![row("a", vec![1.0, 0.0, 0.0, 0.0])]).await.unwrap();
    writer.delete_by_path("/docs/a.txt").await.unwrap();
    assert_eq!(count(&store).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn delete_stale_chunks_removes_only_ids_not_kept() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open_at_path(dir.path().join("t.lancedb"), 4).await.unwrap());
    let writer = VectorStoreWriter::spawn(store.clone());

    writer
      .upsert_chunks(vec![
        row("a", vec![1.0, 0.0, 0.0, 0.0]),
        row("b", vec![0.0, 1.0, 0.0, 0.0]),
        row("c", vec![0.0, 0.0, 1.0, 0.0]),
      ])
      .await
      .unwrap();

    writer.delete_stale_chunks("/docs/a.txt", vec!["a".to_string()]).await.unwrap();
    assert_eq!(count(&store).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn delete_stale_chunks_with_empty_keep_set_clears_the_path() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open_at_path(dir.path().join("t.lancedb"), 4).await.unwrap());
    let writer = VectorStoreWriter::spawn(store.clone());

    writer.upsert_chunks(vec![row("a", vec![1.0, 0.0, 0.0, 0.0])]).await.unwrap();
    writer.delete_stale_chunks("/docs/a.txt", vec![]).await.unwrap();
    assert_eq!(count(&store).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn search_returns_scores_in_unit_range_descending() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open_at_path(dir.path().join("t.lancedb"), 4).await.unwrap());
    let writer = VectorStoreWriter::spawn(store.clone());
    writer
      .upsert_chunks(vec![
        row("a", vec![1.0, 0.0, 0.0, 0.0]),
        row("b", vec![0.0, 1.0, 0.0, 0.0]),
        row("c", vec![-1.0, 0.0, 0.0, 0.0]),
      ])
      .await
      .unwrap();

    let hits = search(&store, vec![1.0, 0.0, 0.0, 0.0], 3).await.unwrap();
    assert!(!hits.is_empty());
    for hit in &hits {
      assert!((0.0..=1.0).contains(&hit.score));
    }
    for pair in hits.windows(2) {
      assert!(pair[0].score >= pair[1].score);
    }
  }

  #[tokio::test]
  async fn upsert_rejects_rows_missing_a_vector() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open_at_path(dir.path().join("t.lancedb"), 4).await.unwrap());
    let writer = VectorStoreWriter::spawn(store.clone());
    let mut unembedded = row("a", vec![]);
    unembedded.vector = None;
    assert!(writer.upsert_chunks(vec![unembedded]).await.is_err());
  }
}
