//! File Status Repository: per-path indexing state, backed by the
//! `file_status` Lance table (mirrors the `chunks`/`_schema_meta` table
//! pattern in [`crate::connection`]).

use arrow_array::{Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use indexer_core::{FileStatus, FileStatusRecord};
use lancedb::query::{ExecutableQuery, QueryBase};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::connection::{DbError, Result, VectorStore};
use crate::schema::file_status_schema;

/// Result of [`scan_for_changes`]: candidate paths bucketed by what, if
/// anything, needs to happen to them.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
  pub new: Vec<PathBuf>,
  pub modified: Vec<PathBuf>,
  pub unchanged: Vec<PathBuf>,
}

/// Loads every row of `file_status` into memory, keyed by path.
pub async fn load(store: &VectorStore) -> Result<HashMap<String, FileStatusRecord>> {
  let table = store.file_status_table().await?;
  let batches: Vec<RecordBatch> = table.query().execute().await?.try_collect().await?;
  let mut out = HashMap::new();

  for batch in &batches {
    for record in records_from_batch(batch) {
      out.insert(record.path.clone(), record);
    }
  }

  Ok(out)
}

/// Loads the single row for `path`, if one exists. Used on the failure path
/// of the per-file pipeline, where pulling the whole table just to find one
/// row would be wasteful.
pub async fn get(store: &VectorStore, path: &str) -> Result<Option<FileStatusRecord>> {
  let table = store.file_status_table().await?;
  let batches: Vec<RecordBatch> =
    table.query().only_if(format!("path = '{}'", escape(path))).execute().await?.try_collect().await?;

  for batch in &batches {
    if let Some(record) = records_from_batch(batch).into_iter().next() {
      return Ok(Some(record));
    }
  }
  Ok(None)
}

fn records_from_batch(batch: &RecordBatch) -> Vec<FileStatusRecord> {
  let paths = string_col(batch, "path");
  let statuses = string_col(batch, "status");
  let parser_versions = int_col(batch, "parser_version");
  let chunk_counts = int_col(batch, "chunk_count");
  let error_messages = string_col(batch, "error_message");
  let last_modifieds = string_col(batch, "last_modified");
  let indexed_ats = string_col(batch, "indexed_at");
  let file_hashes = string_col(batch, "file_hash");
  let last_retries = string_col(batch, "last_retry");
  let failure_counts = int_col(batch, "failure_count");

  (0..batch.num_rows())
    .map(|i| FileStatusRecord {
      path: paths.value(i).to_string(),
      status: FileStatus::parse(statuses.value(i)).unwrap_or(FileStatus::Outdated),
      parser_version: parser_versions.value(i),
      chunk_count: chunk_counts.value(i),
      error_message: error_messages.value(i).to_string(),
      last_modified: last_modifieds.value(i).to_string(),
      indexed_at: indexed_ats.value(i).to_string(),
      file_hash: file_hashes.value(i).to_string(),
      last_retry: last_retries.value(i).to_string(),
      failure_count: failure_counts.value(i),
    })
    .collect()
}

/// Upsert by `path`. The store has no native row update, so this is
/// delete-then-insert — the same approach the Vector Store Writer uses for
/// chunk rows.
///
/// `record` is a fully-typed [`FileStatusRecord`]; every field is required
/// by the struct itself, so there is no way to construct a partial record
/// at the call site. The only remaining fast-fail check is a non-empty key.
pub async fn update(store: &VectorStore, record: &FileStatusRecord) -> Result<()> {
  debug_assert!(!record.path.is_empty(), "file status record must have a path");
  if record.path.is_empty() {
    return Err(DbError::NotFound("refusing to upsert a file status record with an empty path".into()));
  }

  let table = store.file_status_table().await?;
  table.delete(&format!("path = '{}'", escape(&record.path))).await?;

  let schema = file_status_schema();
  let batch = RecordBatch::try_new(
    schema.clone(),
    vec![
      Arc::new(StringArray::from(vec![record.path.clone()])),
      Arc::new(StringArray::from(vec![record.status.as_str().to_string()])),
      Arc::new(Int64Array::from(vec![record.parser_version])),
      Arc::new(Int64Array::from(vec![record.chunk_count])),
      Arc::new(StringArray::from(vec![record.error_message.clone()])),
      Arc::new(StringArray::from(vec![record.last_modified.clone()])),
      Arc::new(StringArray::from(vec![record.indexed_at.clone()])),
      Arc::new(StringArray::from(vec![record.file_hash.clone()])),
      Arc::new(StringArray::from(vec![record.last_retry.clone()])),
      Arc::new(Int64Array::from(vec![record.failure_count])),
    ],
  )?;
  let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
  table.add(Box::new(batches)).execute().await?;
  Ok(())
}

pub async fn delete(store: &VectorStore, path: &str) -> Result<()> {
  let table = store.file_status_table().await?;
  table.delete(&format!("path = '{}'", escape(path))).await?;
  Ok(())
}

fn escape(s: &str) -> String {
  s.replace('\'', "''")
}

/// Retry back-off for `failed`/`outdated` records, escalating with
/// consecutive failures: 1 minute, 10 minutes, then capped at 1 hour.
pub fn retry_backoff(failure_count: i64) -> Duration {
  match failure_count {
    0 => Duration::ZERO,
    1 => Duration::from_secs(60),
    2 => Duration::from_secs(600),
    _ => Duration::from_secs(3600),
  }
}

/// `shouldReindex(path, record)`: true when a failed/outdated record's
/// back-off has elapsed, or when the parser declares a newer version than
/// the one that produced the record's current chunks.
pub fn should_reindex(record: &FileStatusRecord, declared_parser_version: i64) -> bool {
  if record.parser_version < declared_parser_version {
    return true;
  }

  match record.status {
    FileStatus::Failed | FileStatus::Outdated => {
      let last_attempt = parse_rfc3339(&record.last_retry).or_else(|| parse_rfc3339(&record.last_modified));
      match last_attempt {
        Some(t) => {
          let elapsed = chrono::Utc::now().signed_duration_since(t);
          elapsed.to_std().unwrap_or(Duration::ZERO) >= retry_backoff(record.failure_count)
        }
        None => true,
      }
    }
    FileStatus::Queued | FileStatus::Indexed => false,
  }
}

fn parse_rfc3339(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
  chrono::DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&chrono::Utc))
}

/// The Work Queue's enqueue policy: classify each
/// candidate path as `new`, `modified` or `unchanged` against the cached
/// `file_status` rows. Callers (the Scanner, the watcher) are expected to
/// have already filtered candidates by enabled file type and exclude
/// pattern; `registry` support is re-checked here as a second line of
/// defense.
pub fn scan_for_changes(
  paths: &[PathBuf],
  cache: &HashMap<String, FileStatusRecord>,
  registry: &indexer_core::ParserRegistry,
) -> ChangeSet {
  let mut result = ChangeSet::default();

  for path in paths {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    if !registry.supports(&ext) {
      continue;
    }
    let key = path.to_string_lossy().into_owned();

    let Some(record) = cache.get(&key) else {
      result.new.push(path.clone());
      continue;
    };

    let declared = registry.declared_parser_version(&ext).unwrap_or(0);
    if should_reindex(record, declared) {
      result.modified.push(path.clone());
      continue;
    }

    match std::fs::metadata(path) {
      Ok(meta) => {
        let mtime_ms = mtime_millis(&meta);
        let on_disk_newer = match parse_rfc3339(&record.indexed_at) {
          Some(indexed_at) => mtime_ms > indexed_at.timestamp_millis(),
          None => true,
        };
        if !on_disk_newer {
          result.unchanged.push(path.clone());
          continue;
        }
        let fp = indexer_core::fingerprint(meta.len(), mtime_ms as u64);
        if fp != record.file_hash {
          result.modified.push(path.clone());
        } else {
          result.unchanged.push(path.clone());
        }
      }
      Err(_) => result.unchanged.push(path.clone()),
    }
  }

  result
}

fn mtime_millis(meta: &std::fs::Metadata) -> i64 {
  meta
    .modified()
    .ok()
    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
    .map(|d| d.as_millis() as i64)
    .unwrap_or(0)
}

/// Startup reconciliation sweep: deletes status
/// records — and their chunk rows — for paths that no longer resolve on
/// disk. Returns the deleted paths so the caller can log/report them.
pub async fn reconcile_orphans(store: &VectorStore) -> Result<Vec<String>> {
  let cache = load(store).await?;
  let mut orphans = Vec::new();

  for path in cache.keys() {
    if !Path::new(path).exists() {
      orphans.push(path.clone());
    }
  }

  for path in &orphans {
    warn!(path, "file status record has no file on disk, removing");
    delete(store, path).await?;
    let chunks = store.chunks_table().await?;
    chunks.delete(&format!("path = '{}'", escape(path))).await?;
  }

  if !orphans.is_empty() {
    debug!(count = orphans.len(), "reconciliation sweep removed orphan records");
  }

  Ok(orphans)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> &'a arrow_array::StringArray {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<arrow_array::StringArray>())
    .unwrap_or_else(|| panic!("file_status.{name} is Utf8"))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> &'a Int64Array {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
    .unwrap_or_else(|| panic!("file_status.{name} is Int64"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use indexer_core::ParserRegistry;
  use tempfile::TempDir;

  async fn open_test_store() -> (TempDir, VectorStore) {
    let dir = TempDir::new().unwrap();
    let store = VectorStore::open_at_path(dir.path().join("t.lancedb"), 8).await.unwrap();
    (dir, store)
  }

  #[tokio::test]
  async fn update_then_load_round_trips() {
    let (_dir, store) = open_test_store().await;
    let record = FileStatusRecord::new_queued("/docs/a.txt", "2024-01-01T00:00:00Z", "10-1000");
    update(&store, &record).await.unwrap();

    let cache = load(&store).await.unwrap();
    let loaded = cache.get("/docs/a.txt").unwrap();
    assert_eq!(loaded.status, FileStatus::Queued);
    assert_eq!(loaded.file_hash, "10-1000");
  }

  #[tokio::test]
  async fn get_returns_the_matching_row_only() {
    let (_dir, store) = open_test_store().await;
    update(&store, &FileStatusRecord::new_queued("/docs/a.txt", "2024-01-01T00:00:00Z", "10-1000")).await.unwrap();
    update(&store, &FileStatusRecord::new_queued("/docs/b.txt", "2024-01-01T00:00:00Z", "20-2000")).await.unwrap();

    let found = get(&store, "/docs/a.txt").await.unwrap().unwrap();
    assert_eq!(found.file_hash, "10-1000");
  }

  #[tokio::test]
  async fn get_returns_none_for_unknown_path() {
    let (_dir, store) = open_test_store().await;
    assert!(get(&store, "/docs/missing.txt").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn update_replaces_rather_than_duplicates() {
    let (_dir, store) = open_test_store().await;
    let mut record = FileStatusRecord::new_queued("/docs/a.txt", "2024-01-01T00:00:00Z", "10-1000");
    update(&store, &record).await.unwrap();
    record.status = FileStatus::Indexed;
    record.chunk_count = 3;
    update(&store, &record).await.unwrap();

    let cache = load(&store).await.unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("/docs/a.txt").unwrap().chunk_count, 3);
  }

  #[tokio::test]
  async fn delete_removes_the_row() {
    let (_dir, store) = open_test_store().await;
    let record = FileStatusRecord::new_queued("/docs/a.txt", "2024-01-01T00:00:00Z", "10-1000");
    update(&store, &record).await.unwrap();
    delete(&store, "/docs/a.txt").await.unwrap();
    let cache = load(&store).await.unwrap();
    assert!(cache.is_empty());
  }

  #[tokio::test]
  async fn empty_path_is_rejected() {
    let (_dir, store) = open_test_store().await;
    let record = FileStatusRecord::new_queued("", "2024-01-01T00:00:00Z", "10-1000");
    assert!(update(&store, &record).await.is_err());
  }

  #[test]
  fn should_reindex_true_for_newer_parser_version() {
    let record = FileStatusRecord::new_queued("/a.txt", "2024-01-01T00:00:00Z", "10-1000");
    assert!(should_reindex(&record, 2));
    assert!(!should_reindex(&record, 0));
  }

  #[test]
  fn should_reindex_false_for_indexed_with_current_version() {
    let mut record = FileStatusRecord::new_queued("/a.txt", "2024-01-01T00:00:00Z", "10-1000");
    record.status = FileStatus::Indexed;
    record.parser_version = 1;
    assert!(!should_reindex(&record, 1));
  }

  #[test]
  fn should_reindex_true_for_failed_with_no_prior_attempt_timestamp() {
    let mut record = FileStatusRecord::new_queued("/a.txt", "2024-01-01T00:00:00Z", "10-1000");
    record.status = FileStatus::Failed;
    record.last_retry = String::new();
    record.last_modified = String::new();
    assert!(should_reindex(&record, 0));
  }

  #[test]
  fn retry_backoff_escalates() {
    assert_eq!(retry_backoff(0), Duration::ZERO);
    assert_eq!(retry_backoff(1), Duration::from_secs(60));
    assert_eq!(retry_backoff(2), Duration::from_secs(600));
    assert_eq!(retry_backoff(10), Duration::from_secs(3600));
  }

  #[test]
  fn scan_for_changes_skips_unsupported_extensions() {
    let registry = ParserRegistry::default();
    let cache = HashMap::new();
    let result = scan_for_changes(&[PathBuf::from("/a.exe")], &cache, &registry);
    assert!(result.new.is_empty());
    assert!(result.modified.is_empty());
    assert!(result.unchanged.is_empty());
  }

  #[test]
  fn scan_for_changes_classifies_unknown_path_as_new() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "hello").unwrap();
    let registry = ParserRegistry::default();
    let cache = HashMap::new();
    let result = scan_for_changes(&[path.clone()], &cache, &registry);
    assert_eq!(result.new, vec![path]);
  }
}
