pub mod embedding_queue;
pub mod orchestrator;
pub mod query;

pub use embedding_queue::{EmbeddingQueue, EmbeddingQueueConfig, FileProgress, estimate_tokens};
pub use orchestrator::{
  EnqueueParams, Event, Orchestrator, OrchestratorError, OrchestratorState, ProgressSnapshot, SearchFilesParams, SearchParams,
  SettingsDto, SettingsUpdateDto, StatsSnapshot, WatchOptions, WatchStartParams, WatchedFoldersResponse,
};
pub use query::{QueryError, QueryHit, QueryService};
