//! Work Queue + Reconciler: a bounded FIFO of absolute paths feeding
//! the per-file pipeline, with in-queue/in-processing dedup, pause/resume,
//! and the enqueue policy built on top of `db::file_status::scan_for_changes`.

use db::VectorStore;
use indexer_core::ParserRegistry;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::debug;

/// A bounded, deduplicating FIFO. A path already queued or already being
/// processed is never re-enqueued, so at most one build is ever in flight
/// for a given path.
pub struct WorkQueue {
  capacity: usize,
  order: Mutex<VecDeque<PathBuf>>,
  queued: Mutex<HashSet<PathBuf>>,
  processing: Mutex<HashSet<PathBuf>>,
  paused: Mutex<bool>,
  notify: Notify,
}

impl WorkQueue {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      order: Mutex::new(VecDeque::new()),
      queued: Mutex::new(HashSet::new()),
      processing: Mutex::new(HashSet::new()),
      paused: Mutex::new(false),
      notify: Notify::new(),
    }
  }

  /// Enqueues `path` unless it is already queued or in-flight. Returns
  /// `true` if the path was newly enqueued.
  pub fn enqueue(&self, path: PathBuf) -> bool {
    let mut queued = self.queued.lock().unwrap();
    let processing = self.processing.lock().unwrap();
    if queued.contains(&path) || processing.contains(&path) {
      return false;
    }
    queued.insert(path.clone());
    self.order.lock().unwrap().push_back(path);
    drop(processing);
    drop(queued);
    self.notify.notify_one();
    true
  }

  /// Enqueues every path in `paths`, returning how many were newly added.
  pub fn enqueue_all(&self, paths: impl IntoIterator<Item = PathBuf>) -> usize {
    paths.into_iter().filter(|p| self.enqueue(p.clone())).count()
  }

  /// Waits for the next path to process, honoring pause. Moves the path
  /// from "queued" to "processing" before returning it; call [`Self::complete`]
  /// once the per-file pipeline finishes (success or permanent failure).
  pub async fn dequeue(&self) -> PathBuf {
    loop {
      if !*self.paused.lock().unwrap()
        && let Some(path) = self.order.lock().unwrap().pop_front()
      {
        self.queued.lock().unwrap().remove(&path);
        self.processing.lock().unwrap().insert(path.clone());
        return path;
      }
      self.notify.notified().await;
    }
  }

  pub fn complete(&self, path: &std::path::Path) {
    self.processing.lock().unwrap().remove(path);
  }

  pub fn pause(&self) {
    *self.paused.lock().unwrap() = true;
  }

  pub fn resume(&self) {
    *self.paused.lock().unwrap() = false;
    self.notify.notify_waiters();
  }

  pub fn is_paused(&self) -> bool {
    *self.paused.lock().unwrap()
  }

  pub fn queued_len(&self) -> usize {
    self.order.lock().unwrap().len()
  }

  pub fn processing_len(&self) -> usize {
    self.processing.lock().unwrap().len()
  }

  pub fn is_at_capacity(&self) -> bool {
    self.queued_len() >= self.capacity
  }
}

/// Runs the enqueue policy over `candidates` against the current
/// `file_status` table, enqueuing every path classified `new` or
/// `modified`. Returns the count newly enqueued.
pub async fn reconcile_and_enqueue(
  store: &VectorStore,
  queue: &WorkQueue,
  candidates: &[PathBuf],
  registry: &ParserRegistry,
) -> db::Result<usize> {
  let cache = db::file_status::load(store).await?;
  let changes = db::file_status::scan_for_changes(candidates, &cache, registry);

  let to_enqueue = changes.new.into_iter().chain(changes.modified);
  let enqueued = queue.enqueue_all(to_enqueue);
  debug!(enqueued, unchanged = changes.unchanged.len(), "reconciled candidate paths");
  Ok(enqueued)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn enqueue_dedups_paths_already_queued() {
    let queue = WorkQueue::new(10);
    assert!(queue.enqueue(PathBuf::from("/a.txt")));
    assert!(!queue.enqueue(PathBuf::from("/a.txt")));
    assert_eq!(queue.queued_len(), 1);
  }

  #[tokio::test]
  async fn dequeue_moves_path_to_processing() {
    let queue = WorkQueue::new(10);
    queue.enqueue(PathBuf::from("/a.txt"));
    let path = queue.dequeue().await;
    assert_eq!(path, PathBuf::from("/a.txt"));
    assert_eq!(queue.queued_len(), 0);
    assert_eq!(queue.processing_len(), 1);

    queue.complete(&path);
    assert_eq!(queue.processing_len(), 0);
  }

  #[test]
  fn enqueue_rejects_path_already_processing() {
    let queue = WorkQueue::new(10);
    queue.processing.lock().unwrap().insert(PathBuf::from("/a.txt"));
    assert!(!queue.enqueue(PathBuf::from("/a.txt")));
  }

  #[tokio::test]
  async fn paused_queue_does_not_dequeue_until_resumed() {
    let queue = std::sync::Arc::new(WorkQueue::new(10));
    queue.pause();
    queue.enqueue(PathBuf::from("/a.txt"));

    let queue2 = queue.clone();
    let handle = tokio::spawn(async move { queue2.dequeue().await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    queue.resume();
    let path = tokio::time::timeout(std::time::Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(path, PathBuf::from("/a.txt"));
  }

  #[test]
  fn is_at_capacity_reflects_queued_count() {
    let queue = WorkQueue::new(2);
    queue.enqueue(PathBuf::from("/a.txt"));
    assert!(!queue.is_at_capacity());
    queue.enqueue(PathBuf::from("/b.txt"));
    assert!(queue.is_at_capacity());
  }
}
