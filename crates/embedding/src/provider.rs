use async_trait::async_trait;

/// Abstraction the Embedding Queue depends on, so pipeline tests can swap
/// in a stub server instead of the real sidecar.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
  async fn is_available(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("embedder not available")]
  NotAvailable,
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("embedder returned an error: {0}")]
  ProviderError(String),
  #[error("network error: {0}")]
  Network(String),
  #[error("request timed out")]
  Timeout,
  #[error("embedder returned {got}-dim vectors, store expects {expected}")]
  DimensionMismatch { expected: usize, got: usize },
}

impl EmbeddingError {
  /// Transient errors (timeout, 5xx, connection refused) are retried by
  /// the Embedding Queue's batch policy; fatal ones (wrong dimension,
  /// malformed payload) are not.
  pub fn is_transient(&self) -> bool {
    match self {
      EmbeddingError::Network(_) | EmbeddingError::Timeout => true,
      EmbeddingError::Request(err) => err.is_timeout() || err.is_connect() || err.status().is_some_and(|s| s.is_server_error()),
      EmbeddingError::ProviderError(msg) => {
        msg.contains("429") || msg.contains("502") || msg.contains("503") || msg.contains("504")
      }
      EmbeddingError::NotAvailable | EmbeddingError::DimensionMismatch { .. } => false,
    }
  }
}
