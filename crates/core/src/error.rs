use thiserror::Error;

/// Closed set of error kinds surfaced across the pipeline crates.
///
/// Each crate boundary (`index`, `embedding`, `db`, `daemon`) has its own
/// `thiserror` enum; the orchestrator composes those into this kind set via
/// `#[from]` so the external event boundary only ever needs to match on a
/// fixed list of codes.
#[derive(Error, Debug)]
pub enum Error {
  #[error("watcher error: {0}")]
  Watcher(String),

  #[error("parse error: {0}")]
  Parse(String),

  #[error("embedder transient error: {0}")]
  EmbedderTransient(String),

  #[error("embedder fatal error: {0}")]
  EmbedderFatal(String),

  #[error("store conflict: {0}")]
  StoreConflict(String),

  #[error("store schema mismatch: stored dim {stored}, expected {expected}")]
  StoreSchemaMismatch { stored: usize, expected: usize },

  #[error("sidecar down: {0}")]
  SidecarDown(String),

  #[error("startup timeout: {0}")]
  StartupTimeout(String),

  #[error("validation: {0}")]
  Validation(String),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// The stable error code used on the external command/event boundary.
  pub fn code(&self) -> &'static str {
    match self {
      Error::Watcher(_) => "WATCHER_ERROR",
      Error::Parse(_) => "PARSE_ERROR",
      Error::EmbedderTransient(_) => "EMBEDDER_TRANSIENT",
      Error::EmbedderFatal(_) => "EMBEDDER_FATAL",
      Error::StoreConflict(_) => "STORE_CONFLICT",
      Error::StoreSchemaMismatch { .. } => "STORE_SCHEMA_MISMATCH",
      Error::SidecarDown(_) => "SIDECAR_DOWN",
      Error::StartupTimeout(_) => "STARTUP_TIMEOUT",
      Error::Validation(_) => "VALIDATION_ERROR",
      Error::Io(_) => "IO_ERROR",
      Error::Serialization(_) => "SERIALIZATION_ERROR",
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;
