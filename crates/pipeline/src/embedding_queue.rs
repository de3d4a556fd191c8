//! Embedding Queue: a token-budgeted batching producer-consumer
//! sitting between the per-file pipeline and the Embedder Service Client,
//! with backpressure, per-batch retry, and restart recovery.
//!
//! Grounded in `index::queue::WorkQueue`'s dedup-FIFO-plus-`Notify` shape,
//! generalized from one path per queue slot to one chunk per slot, with an
//! "active batches" map standing in for `WorkQueue`'s "processing" set.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use db::writer::VectorStoreWriter;
use embedding::EmbeddingProvider;
use indexer_core::{ChunkRow, Config};
use tokio::sync::{Notify, Semaphore, broadcast, watch};
use tracing::{debug, error, warn};

pub type BatchId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileProgress {
  pub total: usize,
  /// Successes plus permanent (non-retryable, or retries-exhausted) failures.
  pub processed: usize,
  pub errors: usize,
}

impl FileProgress {
  pub fn is_complete(&self) -> bool {
    self.processed >= self.total
  }
}

#[derive(Debug, Clone)]
pub struct EmbeddingQueueConfig {
  pub embedding_batch_size: usize,
  pub max_tokens_per_batch: usize,
  pub max_queue_size: usize,
  pub backpressure_threshold: usize,
  pub max_concurrent_batches: usize,
  pub max_retries: u32,
}

impl From<&Config> for EmbeddingQueueConfig {
  fn from(config: &Config) -> Self {
    Self {
      embedding_batch_size: config.embedding_batch_size,
      max_tokens_per_batch: config.max_tokens_per_batch,
      max_queue_size: config.max_queue_size,
      backpressure_threshold: config.backpressure_threshold,
      max_concurrent_batches: config.cpu_throttle.max_concurrent_batches(),
      max_retries: config.max_retries,
    }
  }
}

#[derive(Debug, Clone)]
struct QueuedChunk {
  row: ChunkRow,
  path: String,
  retry_count: u32,
}

/// Token estimate: `ceil(chars / 2.5)`.
pub fn estimate_tokens(text: &str) -> usize {
  let chars = text.chars().count();
  (chars * 2).div_ceil(5)
}

struct Inner {
  config: EmbeddingQueueConfig,
  queue: Mutex<VecDeque<QueuedChunk>>,
  active: Mutex<HashMap<BatchId, Vec<QueuedChunk>>>,
  trackers: Mutex<HashMap<String, watch::Sender<FileProgress>>>,
  notify_consumer: Notify,
  notify_capacity: Notify,
  next_batch_id: AtomicU64,
  writer: VectorStoreWriter,
  provider: Arc<dyn EmbeddingProvider>,
  semaphore: Arc<Semaphore>,
}

/// Handle to the running queue. Cloning is cheap; every clone shares the
/// same background consumer loop and restart-recovery subscription.
#[derive(Clone)]
pub struct EmbeddingQueue {
  inner: Arc<Inner>,
}

impl EmbeddingQueue {
  /// Spawns the consumer loop and subscribes it to `restart_rx` for the
  /// Embedder Service Client's `onRestart` signal.
  pub fn spawn(
    config: EmbeddingQueueConfig,
    writer: VectorStoreWriter,
    provider: Arc<dyn EmbeddingProvider>,
    mut restart_rx: broadcast::Receiver<()>,
  ) -> Self {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_batches.max(1)));
    let inner = Arc::new(Inner {
      config,
      queue: Mutex::new(VecDeque::new()),
      active: Mutex::new(HashMap::new()),
      trackers: Mutex::new(HashMap::new()),
      notify_consumer: Notify::new(),
      notify_capacity: Notify::new(),
      next_batch_id: AtomicU64::new(0),
      writer,
      provider,
      semaphore,
    });

    {
      let inner = inner.clone();
      tokio::spawn(async move {
        while restart_rx.recv().await.is_ok() {
          handle_restart(&inner);
        }
      });
    }

    {
      let inner = inner.clone();
      tokio::spawn(async move { run_consumer_loop(inner).await });
    }

    Self { inner }
  }

  /// Enqueues every chunk of `path`'s chunker output and returns a watch
  /// receiver that resolves once every chunk has been processed (embedded
  /// and written, or permanently failed). An empty `chunks` resolves
  /// immediately (the Chunker's "no text extracted" case never reaches
  /// here — the orchestrator records that failure without calling this).
  pub async fn add_chunks(&self, chunks: Vec<ChunkRow>, path: &str) -> watch::Receiver<FileProgress> {
    let total = chunks.len();
    let (tx, rx) = watch::channel(FileProgress { total, processed: 0, errors: 0 });
    self.inner.trackers.lock().unwrap().insert(path.to_string(), tx);

    if chunks.is_empty() {
      return rx;
    }

    self.wait_for_capacity().await;

    let mut queue = self.inner.queue.lock().unwrap();
    for row in chunks {
      queue.push_back(QueuedChunk { row, path: path.to_string(), retry_count: 0 });
    }
    drop(queue);
    self.inner.notify_consumer.notify_one();
    rx
  }

  /// Drops the file's progress tracker once a caller has observed
  /// completion. Safe to skip; just means the map grows until the daemon
  /// restarts.
  pub fn forget(&self, path: &str) {
    self.inner.trackers.lock().unwrap().remove(path);
  }

  pub fn queued_len(&self) -> usize {
    self.inner.queue.lock().unwrap().len()
  }

  pub fn active_batches(&self) -> usize {
    self.inner.active.lock().unwrap().len()
  }

  /// Soft backpressure above `backpressure_threshold` (poll-wait), hard
  /// backpressure at `max_queue_size` (block on capacity notifications).
  async fn wait_for_capacity(&self) {
    loop {
      let len = self.inner.queue.lock().unwrap().len();
      if len < self.inner.config.backpressure_threshold {
        return;
      }
      if len < self.inner.config.max_queue_size {
        tokio::task::yield_now().await;
        return;
      }
      self.inner.notify_capacity.notified().await;
    }
  }
}

async fn run_consumer_loop(inner: Arc<Inner>) {
  loop {
    let permit = match inner.semaphore.clone().acquire_owned().await {
      Ok(permit) => permit,
      Err(_) => return, // semaphore closed: queue is shutting down
    };

    let (batch_id, batch) = loop {
      if let Some(taken) = take_batch(&inner) {
        break taken;
      }
      inner.notify_consumer.notified().await;
    };

    let inner = inner.clone();
    tokio::spawn(async move {
      process_batch(&inner, batch_id, batch).await;
      drop(permit);
      inner.notify_consumer.notify_one();
    });
  }
}

/// Greedily takes chunks while cumulative estimated tokens stay under the
/// cap and count stays under `embedding_batch_size`; always takes at least
/// one chunk, even one that alone exceeds the token cap.
fn take_batch(inner: &Inner) -> Option<(BatchId, Vec<QueuedChunk>)> {
  let mut queue = inner.queue.lock().unwrap();
  if queue.is_empty() {
    return None;
  }

  let mut batch = Vec::new();
  let mut tokens = 0usize;
  while let Some(front) = queue.front() {
    let estimate = estimate_tokens(&front.row.text);
    if !batch.is_empty() && (batch.len() >= inner.config.embedding_batch_size || tokens + estimate > inner.config.max_tokens_per_batch)
    {
      break;
    }
    let chunk = queue.pop_front().unwrap();
    tokens += estimate;
    batch.push(chunk);
  }
  drop(queue);

  let batch_id = inner.next_batch_id.fetch_add(1, Ordering::SeqCst);
  inner.active.lock().unwrap().insert(batch_id, batch.clone());
  inner.notify_capacity.notify_waiters();
  Some((batch_id, batch))
}

async fn process_batch(inner: &Inner, batch_id: BatchId, chunks: Vec<QueuedChunk>) {
  let texts: Vec<&str> = chunks.iter().map(|c| c.row.text.as_str()).collect();
  let result = inner.provider.embed_batch(&texts).await;

  // The batch may have been reclaimed by `handle_restart` while the
  // request above was in flight. If so its chunks are already back at the
  // front of the queue; this result is stale and must be discarded rather
  // than double-counted or double-written.
  let still_active = inner.active.lock().unwrap().remove(&batch_id).is_some();
  if !still_active {
    debug!(batch_id, "discarding result for a batch reclaimed by a restart");
    return;
  }

  match result {
    Ok(vectors) => {
      let rows: Vec<ChunkRow> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
          let mut row = chunk.row.clone();
          row.vector = Some(vector);
          row
        })
        .collect();

      match inner.writer.upsert_chunks(rows).await {
        Ok(()) => mark_processed(inner, &chunks, false),
        Err(err) => {
          error!(batch_id, error = %err, "failed to write embedded batch, counting as errors");
          mark_processed(inner, &chunks, true);
        }
      }
    }
    Err(err) => {
      if err.is_transient() {
        retry_or_drop(inner, chunks);
      } else {
        warn!(batch_id, error = %err, "fatal embedder error, dropping batch");
        mark_processed(inner, &chunks, true);
      }
    }
  }
}

/// On a transient embedder failure, re-queue the batch at the *front* of
/// the queue (preserving FIFO among the rest) up to `max_retries` attempts
/// per chunk; past that, the batch is dropped and its chunks are counted
/// as permanent failures — a failed batch never poisons the rest of the
/// file.
fn retry_or_drop(inner: &Inner, mut chunks: Vec<QueuedChunk>) {
  for chunk in &mut chunks {
    chunk.retry_count += 1;
  }
  let retry_count = chunks.first().map(|c| c.retry_count).unwrap_or(0);

  if retry_count <= inner.config.max_retries {
    let mut queue = inner.queue.lock().unwrap();
    for chunk in chunks.into_iter().rev() {
      queue.push_front(chunk);
    }
    drop(queue);
    inner.notify_consumer.notify_one();
  } else {
    warn!(retry_count, "batch exhausted retries, recording permanent failure");
    mark_processed(inner, &chunks, true);
  }
}

fn mark_processed(inner: &Inner, chunks: &[QueuedChunk], errored: bool) {
  let mut by_path: HashMap<&str, usize> = HashMap::new();
  for chunk in chunks {
    *by_path.entry(chunk.path.as_str()).or_default() += 1;
  }

  let trackers = inner.trackers.lock().unwrap();
  for (path, count) in by_path {
    if let Some(tx) = trackers.get(path) {
      tx.send_modify(|progress| {
        progress.processed += count;
        if errored {
          progress.errors += count;
        }
      });
    }
  }
}

/// Restart recovery: every batch still tracked as active is
/// re-inserted at the front of the queue in its original relative order
/// and the active map is cleared, so in-flight work resumes ahead of
/// newly-enqueued chunks once the sidecar is healthy again.
fn handle_restart(inner: &Inner) {
  let batches: Vec<_> = inner.active.lock().unwrap().drain().collect();
  if batches.is_empty() {
    return;
  }

  let mut queue = inner.queue.lock().unwrap();
  for (_, chunks) in batches.into_iter().rev() {
    for chunk in chunks.into_iter().rev() {
      queue.push_front(chunk);
    }
  }
  drop(queue);
  inner.notify_consumer.notify_one();
  inner.notify_capacity.notify_waiters();
}
