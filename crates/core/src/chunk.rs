use serde::{Deserialize, Serialize};

/// A single stored chunk row: `(chunk, vector, metadata)`.
///
/// `id` is content-addressed — see [`crate::fingerprint::chunk_id`] — so
/// re-indexing the same `(path, page, offset)` triplet replaces the row in
/// place rather than duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRow {
  pub id: String,
  pub path: String,
  /// File modification time at index time, in milliseconds.
  pub mtime: i64,
  /// 0 when the source format has no pages.
  pub page: i64,
  /// Character offset of the chunk's start within the source (or page) text.
  pub offset: i64,
  pub text: String,
  /// Length must equal the store's configured dimensionality; `None` is
  /// only valid transiently, before the Embedding Queue has filled it in.
  pub vector: Option<Vec<f32>>,
  /// Lowercase extension, e.g. "txt".
  pub r#type: String,
  /// Filename, not the full path.
  pub title: String,
}

impl ChunkRow {
  pub fn new(path: &str, mtime: i64, page: i64, offset: i64, text: String, ext: &str) -> Self {
    let title = std::path::Path::new(path)
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.to_string());
    Self {
      id: crate::fingerprint::chunk_id(path, page, offset),
      path: path.to_string(),
      mtime,
      page,
      offset,
      text,
      vector: None,
      r#type: ext.to_lowercase(),
      title,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
  Queued,
  Indexed,
  Failed,
  Outdated,
}

impl FileStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      FileStatus::Queued => "queued",
      FileStatus::Indexed => "indexed",
      FileStatus::Failed => "failed",
      FileStatus::Outdated => "outdated",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "queued" => Some(Self::Queued),
      "indexed" => Some(Self::Indexed),
      "failed" => Some(Self::Failed),
      "outdated" => Some(Self::Outdated),
      _ => None,
    }
  }
}

/// Per-path record tracking indexing state. Every write must populate every
/// field — the repository contract rejects partial records rather than
/// silently accepting them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatusRecord {
  pub path: String,
  pub status: FileStatus,
  pub parser_version: i64,
  pub chunk_count: i64,
  pub error_message: String,
  /// ISO-8601 of the file's mtime at last attempt.
  pub last_modified: String,
  /// ISO-8601 of last successful indexing; empty otherwise.
  pub indexed_at: String,
  pub file_hash: String,
  /// ISO-8601 of last failed attempt; empty when none.
  pub last_retry: String,
  /// Consecutive failure count, used to compute the retry back-off.
  pub failure_count: i64,
}

impl FileStatusRecord {
  pub fn new_queued(path: &str, last_modified: &str, file_hash: &str) -> Self {
    Self {
      path: path.to_string(),
      status: FileStatus::Queued,
      parser_version: 0,
      chunk_count: 0,
      error_message: String::new(),
      last_modified: last_modified.to_string(),
      indexed_at: String::new(),
      file_hash: file_hash.to_string(),
      last_retry: String::new(),
      failure_count: 0,
    }
  }
}
