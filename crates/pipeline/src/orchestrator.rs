//! Indexer Orchestrator: the top-level state machine that owns
//! startup, the watched-folder set, the per-file pipeline loop, and the
//! whole command surface exposed over the daemon's Unix socket. Background
//! work (the watcher, sidecar recovery) runs as `tokio::select!`-over-
//! `interval`-plus-`broadcast`-shutdown loops alongside the sequential
//! startup that brings the state machine up to `READY`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use db::writer::VectorStoreWriter;
use db::{DbError, VectorStore};
use embedding::sidecar::{SidecarConfig, SidecarSupervisor};
use embedding::EmbeddingError;
use index::{BatchProcessor, ChangeKind, DebounceConfig, DebouncedWatcher, Scanner, WorkQueue};
use indexer_core::{ChunkRow, Config, ConfigStore, CpuThrottle, FileStatus, FileStatusRecord, ParserRegistry, SettingsUpdate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::embedding_queue::{EmbeddingQueue, EmbeddingQueueConfig};
use crate::query::{QueryError, QueryHit, QueryService};

#[derive(Debug, Error)]
pub enum OrchestratorError {
  #[error("config error: {0}")]
  Config(#[from] indexer_core::Error),
  #[error("store error: {0}")]
  Store(#[from] DbError),
  #[error("embedder error: {0}")]
  Embedder(#[from] EmbeddingError),
  #[error("query error: {0}")]
  Query(#[from] QueryError),
  #[error("watch error: {0}")]
  Watch(#[from] index::WatchError),
}

/// The orchestrator's state table, collapsed to the variants actually
/// reachable: a cold start always visits `SidecarStarting` → `SidecarHealthcheck` →
/// (`WipingChunks`) → `LoadingState` → `Ready`; `Paused`/`Reindexing` are
/// reachable only from `Ready` and always return to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrchestratorState {
  Init,
  SidecarStarting,
  SidecarHealthcheck,
  WipingChunks,
  LoadingState,
  Ready,
  Paused,
  Reindexing,
  ShuttingDown,
  Error,
}

impl OrchestratorState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Init => "init",
      Self::SidecarStarting => "sidecarStarting",
      Self::SidecarHealthcheck => "sidecarHealthcheck",
      Self::WipingChunks => "wipingChunks",
      Self::LoadingState => "loadingState",
      Self::Ready => "ready",
      Self::Paused => "paused",
      Self::Reindexing => "reindexing",
      Self::ShuttingDown => "shuttingDown",
      Self::Error => "error",
    }
  }
}

/// The event vocabulary emitted over the daemon's Unix socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
  Ready,
  FilesLoaded { count: usize },
  Progress(ProgressSnapshot),
  PipelineStatus { state: &'static str },
  Stage { stage: String, message: String, progress: Option<f32> },
  Error { code: String, message: String, details: Option<serde_json::Value> },
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
  pub queued: usize,
  pub processing: usize,
  pub processed: u64,
  pub failed: u64,
  pub state: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOptions {
  #[serde(default)]
  pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStartParams {
  pub roots: Vec<PathBuf>,
  #[serde(default)]
  pub options: Option<WatchOptions>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedFoldersResponse {
  pub folders: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueParams {
  pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
  pub q: String,
  #[serde(default)]
  pub k: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilesParams {
  pub query: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
  pub total_chunks: usize,
  pub total_files: usize,
  pub indexed_files: usize,
  pub failed_files: usize,
  pub queued_files: usize,
}

/// Wire-facing mirror of [`Config`]: the daemon's socket protocol is
/// camelCase while `Config`'s own persisted JSON is plain-named (it's
/// read/written only by this process). Kept as a distinct type rather than
/// adding `#[serde(rename_all)]` to `Config` itself, so `config.json` stays
/// stable across a wire-protocol change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDto {
  pub watched_folders: Vec<PathBuf>,
  pub exclude_patterns: Vec<String>,
  pub file_types: std::collections::HashMap<String, bool>,
  pub embedding_batch_size: usize,
  pub max_tokens_per_batch: usize,
  pub max_queue_size: usize,
  pub backpressure_threshold: usize,
  pub embedder_port: u16,
  pub cpu_throttle: CpuThrottle,
  pub max_file_size_bytes: u64,
  pub max_retries: u32,
}

impl From<&Config> for SettingsDto {
  fn from(config: &Config) -> Self {
    Self {
      watched_folders: config.watched_folders.clone(),
      exclude_patterns: config.exclude_patterns.clone(),
      file_types: config.file_types.clone(),
      embedding_batch_size: config.embedding_batch_size,
      max_tokens_per_batch: config.max_tokens_per_batch,
      max_queue_size: config.max_queue_size,
      backpressure_threshold: config.backpressure_threshold,
      embedder_port: config.embedder_port,
      cpu_throttle: config.cpu_throttle,
      max_file_size_bytes: config.max_file_size_bytes,
      max_retries: config.max_retries,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsUpdateDto {
  pub exclude_patterns: Option<Vec<String>>,
  pub file_types: Option<std::collections::HashMap<String, bool>>,
  pub embedding_batch_size: Option<usize>,
  pub max_tokens_per_batch: Option<usize>,
  pub max_queue_size: Option<usize>,
  pub backpressure_threshold: Option<usize>,
  pub embedder_port: Option<u16>,
  pub cpu_throttle: Option<CpuThrottle>,
  pub max_file_size_bytes: Option<u64>,
  pub max_retries: Option<u32>,
}

impl From<SettingsUpdateDto> for SettingsUpdate {
  fn from(dto: SettingsUpdateDto) -> Self {
    Self {
      exclude_patterns: dto.exclude_patterns,
      file_types: dto.file_types,
      embedding_batch_size: dto.embedding_batch_size,
      max_tokens_per_batch: dto.max_tokens_per_batch,
      max_queue_size: dto.max_queue_size,
      backpressure_threshold: dto.backpressure_threshold,
      embedder_port: dto.embedder_port,
      cpu_throttle: dto.cpu_throttle,
      max_file_size_bytes: dto.max_file_size_bytes,
      max_retries: dto.max_retries,
    }
  }
}

struct Watched {
  roots: Mutex<HashSet<PathBuf>>,
}

pub struct Orchestrator {
  data_dir: PathBuf,
  config_store: Mutex<ConfigStore>,
  registry: Arc<ParserRegistry>,
  store: Arc<VectorStore>,
  writer: VectorStoreWriter,
  supervisor: Arc<SidecarSupervisor>,
  queue: Arc<WorkQueue>,
  embedding_queue: EmbeddingQueue,
  query_service: QueryService,
  watched: Watched,
  /// Lets `&self` command handlers (e.g. `watch_start`) spawn new
  /// `Arc`-owning background tasks without every method needing to take
  /// `self: Arc<Self>`. Populated once, immediately after construction.
  self_weak: Mutex<Option<Weak<Orchestrator>>>,
  state_tx: watch::Sender<OrchestratorState>,
  events_tx: broadcast::Sender<Event>,
  shutdown_tx: broadcast::Sender<()>,
  files_processed: AtomicU64,
  files_failed: AtomicU64,
}

impl Orchestrator {
  /// Drives `INIT` → ... → `READY`, then spawns the background
  /// pipeline/watcher/recovery loops and returns the running handle.
  pub async fn start(data_dir: PathBuf, sidecar_config: SidecarConfig) -> Result<Arc<Self>, OrchestratorError> {
    let (events_tx, _) = broadcast::channel(256);
    let (shutdown_tx, _) = broadcast::channel(4);
    let (state_tx, _) = watch::channel(OrchestratorState::Init);

    let config_store = ConfigStore::load(indexer_core::paths::config_path(&data_dir))?;
    let registry = Arc::new(ParserRegistry::default());

    set_state(&state_tx, &events_tx, OrchestratorState::SidecarStarting);
    let supervisor = Arc::new(SidecarSupervisor::spawn(sidecar_config).await?);

    set_state(&state_tx, &events_tx, OrchestratorState::SidecarHealthcheck);
    let info = supervisor.info().await?;

    let store = Arc::new(VectorStore::open_at_path(indexer_core::paths::store_dir(&data_dir).join("lancedb"), info.dim).await?);
    let writer = VectorStoreWriter::spawn(store.clone());

    if store.schema_wiped {
      set_state(&state_tx, &events_tx, OrchestratorState::WipingChunks);
      requeue_everything(&store).await?;
    }

    set_state(&state_tx, &events_tx, OrchestratorState::LoadingState);
    let orphans = db::file_status::reconcile_orphans(&store).await?;
    if !orphans.is_empty() {
      info!(count = orphans.len(), "removed orphaned file-status records at startup");
    }

    let config = config_store.get().clone();
    let queue = Arc::new(WorkQueue::new(config.max_queue_size));
    let embedding_queue = EmbeddingQueue::spawn(
      EmbeddingQueueConfig::from(&config),
      writer.clone(),
      Arc::new(supervisor.client()),
      supervisor.subscribe_restarts(),
    );
    let query_service = QueryService::new(store.clone(), Arc::new(supervisor.client()));

    let orchestrator = Arc::new(Self {
      data_dir,
      config_store: Mutex::new(config_store),
      registry,
      store,
      writer,
      supervisor,
      queue,
      embedding_queue,
      query_service,
      watched: Watched { roots: Mutex::new(HashSet::new()) },
      self_weak: Mutex::new(None),
      state_tx,
      events_tx,
      shutdown_tx,
      files_processed: AtomicU64::new(0),
      files_failed: AtomicU64::new(0),
    });

    *orchestrator.self_weak.lock().unwrap() = Some(Arc::downgrade(&orchestrator));

    let mut total_loaded = 0;
    for root in config.watched_folders.clone() {
      total_loaded += orchestrator.reconcile_root(&root).await?;
      orchestrator.watched.roots.lock().unwrap().insert(root.clone());
      orchestrator.clone().spawn_watcher_task(root);
    }

    set_state(&orchestrator.state_tx, &orchestrator.events_tx, OrchestratorState::Ready);
    let _ = orchestrator.events_tx.send(Event::Ready);
    let _ = orchestrator.events_tx.send(Event::FilesLoaded { count: total_loaded });

    orchestrator.clone().spawn_pipeline_workers();
    orchestrator.clone().spawn_sidecar_recovery_task();

    Ok(orchestrator)
  }

  pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
    self.events_tx.subscribe()
  }

  pub fn state(&self) -> OrchestratorState {
    *self.state_tx.borrow()
  }

  fn set_state(&self, state: OrchestratorState) {
    set_state(&self.state_tx, &self.events_tx, state);
  }

  // ---- command surface ----

  pub async fn watch_start(&self, params: WatchStartParams) -> Result<WatchedFoldersResponse, OrchestratorError> {
    if let Some(options) = params.options
      && let Some(exclude) = options.exclude
    {
      let mut store = self.config_store.lock().unwrap();
      store.update_settings(SettingsUpdate { exclude_patterns: Some(exclude), ..Default::default() })?;
    }

    let mut folders = self.config_store.lock().unwrap().get().watched_folders.clone();
    for root in &params.roots {
      if !folders.contains(root) {
        folders.push(root.clone());
      }
    }
    self.config_store.lock().unwrap().set_watched_folders(folders.clone())?;

    for root in &params.roots {
      let newly_watched = self.watched.roots.lock().unwrap().insert(root.clone());
      if newly_watched {
        self.reconcile_root(root).await?;
        if let Some(arc_self) = self.upgrade() {
          arc_self.spawn_watcher_task(root.clone());
        }
      }
    }

    Ok(WatchedFoldersResponse { folders })
  }

  pub fn enqueue(&self, params: EnqueueParams) -> usize {
    let config = self.config_store.lock().unwrap().get().clone();
    let valid: Vec<PathBuf> = params
      .paths
      .into_iter()
      .filter(|p| {
        p.extension()
          .and_then(|e| e.to_str())
          .is_some_and(|ext| self.registry.supports(ext) && config.is_extension_enabled(ext))
      })
      .collect();
    self.queue.enqueue_all(valid)
  }

  pub fn pause(&self) {
    self.queue.pause();
    self.set_state(OrchestratorState::Paused);
  }

  pub fn resume(&self) {
    self.queue.resume();
    self.set_state(OrchestratorState::Ready);
  }

  pub fn progress(&self) -> ProgressSnapshot {
    ProgressSnapshot {
      queued: self.queue.queued_len(),
      processing: self.queue.processing_len(),
      processed: self.files_processed.load(Ordering::Relaxed),
      failed: self.files_failed.load(Ordering::Relaxed),
      state: self.state().as_str(),
    }
  }

  pub async fn search(&self, params: SearchParams) -> Result<Vec<QueryHit>, OrchestratorError> {
    Ok(self.query_service.query(&params.q, params.k).await?)
  }

  pub async fn stats(&self) -> Result<StatsSnapshot, OrchestratorError> {
    let total_chunks = db::writer::count(&self.store).await?;
    let cache = db::file_status::load(&self.store).await?;
    let mut indexed = 0;
    let mut failed = 0;
    let mut queued = 0;
    for record in cache.values() {
      match record.status {
        FileStatus::Indexed => indexed += 1,
        FileStatus::Failed => failed += 1,
        FileStatus::Queued | FileStatus::Outdated => queued += 1,
      }
    }
    Ok(StatsSnapshot { total_chunks, total_files: cache.len(), indexed_files: indexed, failed_files: failed, queued_files: queued })
  }

  pub async fn search_files(&self, params: SearchFilesParams) -> Result<Vec<String>, OrchestratorError> {
    let cache = db::file_status::load(&self.store).await?;
    let needle = params.query.to_lowercase();
    let mut matches: Vec<String> = cache.keys().filter(|path| path.to_lowercase().contains(&needle)).cloned().collect();
    matches.sort();
    Ok(matches)
  }

  pub fn get_watched_folders(&self) -> WatchedFoldersResponse {
    WatchedFoldersResponse { folders: self.config_store.lock().unwrap().get().watched_folders.clone() }
  }

  pub fn get_settings(&self) -> SettingsDto {
    SettingsDto::from(self.config_store.lock().unwrap().get())
  }

  pub fn update_settings(&self, update: SettingsUpdateDto) -> Result<SettingsDto, OrchestratorError> {
    let mut store = self.config_store.lock().unwrap();
    store.update_settings(update.into())?;
    Ok(SettingsDto::from(store.get()))
  }

  /// Forces every watched folder through a fresh scan and re-enqueues
  /// every file regardless of its cached fingerprint.
  pub async fn reindex_all(&self) -> Result<usize, OrchestratorError> {
    self.set_state(OrchestratorState::Reindexing);
    let folders = self.config_store.lock().unwrap().get().watched_folders.clone();

    let config = self.config_store.lock().unwrap().get().clone();
    let mut total = 0;
    for root in &folders {
      let scan = Scanner::new().scan(root, &self.registry, &config, |_| {});
      total += self.queue.enqueue_all(scan.files.into_iter().map(|f| f.path));
    }

    self.set_state(OrchestratorState::Ready);
    Ok(total)
  }

  pub async fn shutdown(&self) {
    self.set_state(OrchestratorState::ShuttingDown);
    let _ = self.shutdown_tx.send(());
    self.supervisor.shutdown().await;
  }

  // ---- internals ----

  fn upgrade(&self) -> Option<Arc<Self>> {
    self.self_weak.lock().unwrap().as_ref().and_then(Weak::upgrade)
  }

  /// Root data directory this instance was started with (`config.json`,
  /// `data/`, `logs/` all live beneath it); exposed for the daemon's
  /// `status` command and log-path resolution.
  pub fn data_dir(&self) -> &Path {
    &self.data_dir
  }

  async fn reconcile_root(&self, root: &Path) -> Result<usize, OrchestratorError> {
    let config = self.config_store.lock().unwrap().get().clone();
    let scan = Scanner::new().scan(root, &self.registry, &config, |_| {});
    let candidates: Vec<PathBuf> = scan.files.into_iter().map(|f| f.path).collect();
    let enqueued = index::reconcile_and_enqueue(&self.store, &self.queue, &candidates, &self.registry).await?;
    Ok(enqueued)
  }

  fn spawn_watcher_task(self: Arc<Self>, root: PathBuf) {
    let poll_ms = self.config_store.lock().unwrap().get().cpu_throttle.watcher_poll_interval_ms();
    let mut shutdown_rx = self.shutdown_tx.subscribe();

    tokio::spawn(async move {
      let exclude_patterns = self.config_store.lock().unwrap().get().exclude_patterns.clone();
      let watcher = match DebouncedWatcher::with_excludes(&root, DebounceConfig::default(), &exclude_patterns) {
        Ok(w) => w,
        Err(err) => {
          error!(%err, root = %root.display(), "failed to start watcher");
          return;
        }
      };
      let mut processor = BatchProcessor::with_interval(watcher, Duration::from_millis(poll_ms));
      let mut tick = tokio::time::interval(Duration::from_millis(poll_ms));

      loop {
        tokio::select! {
          _ = tick.tick() => {
            let queue = self.queue.clone();
            let registry = &self.registry;
            let config = self.config_store.lock().unwrap().get().clone();
            let _ = processor.process_batch(|change| match change.kind {
              ChangeKind::Add | ChangeKind::Change => {
                let enabled = change
                  .path
                  .extension()
                  .and_then(|e| e.to_str())
                  .is_some_and(|ext| registry.supports(ext) && config.is_extension_enabled(ext));
                if enabled {
                  queue.enqueue(change.path);
                }
              }
              ChangeKind::Unlink => {
                debug!(path = %change.path.display(), "file removed, will be reconciled as orphan");
              }
            });
          }
          _ = shutdown_rx.recv() => {
            debug!(root = %root.display(), "watcher task shutting down");
            break;
          }
        }
      }
    });
  }

  fn spawn_sidecar_recovery_task(self: Arc<Self>) {
    let mut shutdown_rx = self.shutdown_tx.subscribe();
    tokio::spawn(async move {
      let mut tick = tokio::time::interval(Duration::from_secs(2));
      loop {
        tokio::select! {
          _ = tick.tick() => {
            if let Err(err) = self.supervisor.check_and_recover().await {
              error!(%err, "sidecar recovery failed");
              let _ = self.events_tx.send(Event::Error {
                code: "SIDECAR_DOWN".to_string(),
                message: err.to_string(),
                details: None,
              });
            }
          }
          _ = shutdown_rx.recv() => break,
        }
      }
    });
  }

  /// One worker per configured concurrency slot, each looping `dequeue →
  /// process_file → complete` as a cooperative task runner.
  fn spawn_pipeline_workers(self: Arc<Self>) {
    let worker_count = self.config_store.lock().unwrap().get().cpu_throttle.max_concurrent_batches();
    for _ in 0..worker_count.max(1) {
      let this = self.clone();
      let mut shutdown_rx = self.shutdown_tx.subscribe();
      tokio::spawn(async move {
        loop {
          tokio::select! {
            path = this.queue.dequeue() => {
              this.process_file(&path).await;
              this.queue.complete(&path);
            }
            _ = shutdown_rx.recv() => break,
          }
        }
      });
    }
  }

  async fn process_file(&self, path: &Path) {
    let path_str = path.to_string_lossy().into_owned();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();

    let Some(parser) = self.registry.get(&ext) else {
      self.record_failure(&path_str, "no parser registered for extension", 0, "").await;
      return;
    };

    let metadata = match std::fs::metadata(path) {
      Ok(m) => m,
      Err(err) => {
        self.record_failure(&path_str, &format!("reading metadata: {err}"), parser.parser_version(), "").await;
        return;
      }
    };
    let mtime_ms = metadata
      .modified()
      .ok()
      .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
      .map(|d| d.as_millis() as i64)
      .unwrap_or(0);
    let file_hash = indexer_core::fingerprint(metadata.len(), mtime_ms as u64);

    let output = match parser.parse(path) {
      Ok(output) => output,
      Err(err) => {
        self.record_failure(&path_str, &err.to_string(), parser.parser_version(), &file_hash).await;
        return;
      }
    };

    let chunker_config = indexer_core::ChunkerConfig { chunk_size: parser.chunk_size(), chunk_overlap: parser.chunk_overlap() };
    let pages = output.pages.unwrap_or_else(|| vec![indexer_core::Page { page: 0, text: output.text }]);

    let mut rows = Vec::new();
    for page in &pages {
      for chunk in indexer_core::chunk_text(&page.text, &chunker_config) {
        rows.push(ChunkRow::new(&path_str, mtime_ms, page.page, chunk.offset as i64, chunk.text, &ext));
      }
    }

    if rows.is_empty() {
      // Nothing to replace the previous version's chunks with — leave them
      // searchable rather than delete first and discover there's nothing to
      // write back.
      self.record_failure(&path_str, "no text extracted", parser.parser_version(), &file_hash).await;
      return;
    }

    let total = rows.len();
    let keep_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let mut progress_rx = self.embedding_queue.add_chunks(rows, &path_str).await;
    let _ = progress_rx.wait_for(|p| p.is_complete()).await;
    let final_progress = *progress_rx.borrow();
    self.embedding_queue.forget(&path_str);

    let indexed_at = chrono::Utc::now().to_rfc3339();
    let record = if final_progress.errors < final_progress.total {
      // At least one chunk's replacement row is written. Now, and only now,
      // is it safe to remove whatever the previous version left behind at
      // ids this version no longer produces.
      if let Err(err) = self.writer.delete_stale_chunks(&path_str, keep_ids).await {
        warn!(%err, "failed to clean up stale chunks");
      }
      FileStatusRecord {
        path: path_str,
        status: FileStatus::Indexed,
        parser_version: parser.parser_version(),
        chunk_count: (total - final_progress.errors) as i64,
        error_message: String::new(),
        last_modified: indexed_at.clone(),
        indexed_at,
        file_hash,
        last_retry: String::new(),
        failure_count: 0,
      }
    } else {
      // Every chunk failed to embed: the previous version's rows are left
      // untouched, so the file stays searchable under its old content.
      self.files_failed.fetch_add(1, Ordering::Relaxed);
      let prior = db::file_status::get(&self.store, &path_str).await.ok().flatten();
      FileStatusRecord {
        path: path_str,
        status: FileStatus::Failed,
        parser_version: parser.parser_version(),
        chunk_count: 0,
        error_message: "every chunk failed to embed".to_string(),
        last_modified: indexed_at.clone(),
        indexed_at: String::new(),
        file_hash,
        last_retry: indexed_at,
        failure_count: prior.map(|p| p.failure_count + 1).unwrap_or(1),
      }
    };

    if let Err(err) = db::file_status::update(&self.store, &record).await {
      warn!(%err, "failed to persist file status");
    }
    self.files_processed.fetch_add(1, Ordering::Relaxed);
    let _ = self.events_tx.send(Event::Progress(self.progress()));
  }

  /// Records a failed attempt, preserving the file's identity across
  /// retries: `file_hash` carries forward (the caller's value if it managed
  /// to compute one, the prior record's otherwise) so `scan_for_changes`'s
  /// fingerprint comparison doesn't mistake a failed file for a freshly
  /// modified one, and `failure_count` increments from whatever was already
  /// on record so the back-off in `should_reindex` actually escalates.
  async fn record_failure(&self, path: &str, message: &str, parser_version: i64, file_hash: &str) {
    warn!(path, message, "file failed processing");
    self.files_failed.fetch_add(1, Ordering::Relaxed);
    let prior = db::file_status::get(&self.store, path).await.ok().flatten();
    let file_hash =
      if !file_hash.is_empty() { file_hash.to_string() } else { prior.as_ref().map(|p| p.file_hash.clone()).unwrap_or_default() };
    let now = chrono::Utc::now().to_rfc3339();
    let record = FileStatusRecord {
      path: path.to_string(),
      status: FileStatus::Failed,
      parser_version,
      chunk_count: 0,
      error_message: message.to_string(),
      last_modified: now.clone(),
      indexed_at: String::new(),
      file_hash,
      last_retry: now,
      failure_count: prior.map(|p| p.failure_count + 1).unwrap_or(1),
    };
    if let Err(err) = db::file_status::update(&self.store, &record).await {
      warn!(%err, "failed to persist failure status");
    }
  }
}

fn set_state(state_tx: &watch::Sender<OrchestratorState>, events_tx: &broadcast::Sender<Event>, state: OrchestratorState) {
  let _ = state_tx.send(state);
  let _ = events_tx.send(Event::PipelineStatus { state: state.as_str() });
}

/// After a schema wipe, every `file_status` row is reset to `Queued` with
/// `parser_version` zeroed so the next reconcile
/// sweep treats it as needing re-embedding, even though the row itself
/// (and its file hash) survives.
async fn requeue_everything(store: &VectorStore) -> Result<(), OrchestratorError> {
  let cache = db::file_status::load(store).await?;
  for mut record in cache.into_values() {
    record.status = FileStatus::Queued;
    record.parser_version = 0;
    db::file_status::update(store, &record).await?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn state_as_str_matches_wire_vocabulary() {
    assert_eq!(OrchestratorState::SidecarHealthcheck.as_str(), "sidecarHealthcheck");
    assert_eq!(OrchestratorState::WipingChunks.as_str(), "wipingChunks");
  }

  #[test]
  fn settings_update_dto_converts_only_present_fields() {
    let dto = SettingsUpdateDto { max_queue_size: Some(50), ..Default::default() };
    let update: SettingsUpdate = dto.into();
    assert_eq!(update.max_queue_size, Some(50));
    assert_eq!(update.embedding_batch_size, None);
  }

  #[test]
  fn settings_dto_mirrors_config_fields() {
    let config = Config::default();
    let dto = SettingsDto::from(&config);
    assert_eq!(dto.embedding_batch_size, config.embedding_batch_size);
    assert_eq!(dto.max_queue_size, config.max_queue_size);
  }
}
