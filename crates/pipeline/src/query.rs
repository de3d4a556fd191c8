//! Query Service: embeds a query string and searches the vector
//! store, never blocking on indexing activity — reads go straight to
//! `db::writer::search`, which opens its own table handle independent of
//! the Vector Store Writer's actor queue.

use std::sync::Arc;

use db::VectorStore;
use embedding::{EmbeddingError, EmbeddingProvider};
use serde::Serialize;
use thiserror::Error;

const DEFAULT_K: usize = 10;

#[derive(Debug, Error)]
pub enum QueryError {
  #[error("embedding query text: {0}")]
  Embed(#[from] EmbeddingError),
  #[error("searching vector store: {0}")]
  Store(#[from] db::DbError),
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
  pub id: String,
  pub path: String,
  pub page: i64,
  pub offset: i64,
  pub text: String,
  pub title: String,
  pub score: f32,
}

impl From<db::writer::SearchHit> for QueryHit {
  fn from(hit: db::writer::SearchHit) -> Self {
    Self { id: hit.id, path: hit.path, page: hit.page, offset: hit.offset, text: hit.text, title: hit.title, score: hit.score }
  }
}

/// Embeds a query and ranks chunks against the current vector store.
/// Cheap to clone: holds only an `Arc<VectorStore>` and an `Arc<dyn
/// EmbeddingProvider>`.
#[derive(Clone)]
pub struct QueryService {
  store: Arc<VectorStore>,
  embedder: Arc<dyn EmbeddingProvider>,
}

impl QueryService {
  pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
    Self { store, embedder }
  }

  /// Runs a semantic search for `q`, returning up to `k` hits ordered by
  /// descending score. `k` defaults to 10 when `None` or `0`.
  pub async fn query(&self, q: &str, k: Option<usize>) -> Result<Vec<QueryHit>, QueryError> {
    let k = match k {
      Some(0) | None => DEFAULT_K,
      Some(k) => k,
    };
    let vector = self.embedder.embed(q).await?;
    let hits = db::writer::search(&self.store, vector, k).await?;
    Ok(hits.into_iter().map(QueryHit::from).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use db::writer::VectorStoreWriter;
  use indexer_core::ChunkRow;
  use tempfile::TempDir;

  struct StubProvider {
    dim: usize,
  }

  #[async_trait]
  impl EmbeddingProvider for StubProvider {
    fn name(&self) -> &str {
      "stub"
    }
    fn model_id(&self) -> &str {
      "stub-model"
    }
    fn dimensions(&self) -> usize {
      self.dim
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
      Ok(vec![0.1; self.dim])
    }
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      Ok(texts.iter().map(|_| vec![0.1; self.dim]).collect())
    }
    async fn is_available(&self) -> bool {
      true
    }
  }

  #[tokio::test]
  async fn query_returns_mapped_hits_for_hello() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open_at_path(dir.path().join("t.lancedb"), 4).await.unwrap());
    let writer = VectorStoreWriter::spawn(store.clone());

    let mut row = ChunkRow::new("/docs/hello.txt", 1000, 0, 0, "hello world".to_string(), "txt");
    row.vector = Some(vec![0.1, 0.1, 0.1, 0.1]);
    writer.upsert_chunks(vec![row]).await.unwrap();

    let service = QueryService::new(store, Arc::new(StubProvider { dim: 4 }));
    let hits = service.query("hello", None).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "/docs/hello.txt");
    assert_eq!(hits[0].title, "hello.txt");
    assert!(hits[0].score >= 0.0 && hits[0].score <= 1.0);
  }

  #[tokio::test]
  async fn query_defaults_k_to_ten() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open_at_path(dir.path().join("t.lancedb"), 4).await.unwrap());
    let writer = VectorStoreWriter::spawn(store.clone());

    for i in 0..15 {
      let mut row = ChunkRow::new("/docs/many.txt", 1000, 0, i * 10, format!("chunk {i}"), "txt");
      row.vector = Some(vec![0.1, 0.1, 0.1, 0.1]);
      writer.upsert_chunks(vec![row]).await.unwrap();
    }

    let service = QueryService::new(store, Arc::new(StubProvider { dim: 4 }));
    let hits = service.query("chunk", None).await.unwrap();
    assert_eq!(hits.len(), 10);
  }
}
