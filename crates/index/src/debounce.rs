//! Debounced wrapper around [`FileWatcher`]: batches raw filesystem
//! events per path so a burst of writes to the same file collapses into one
//! change, and tracks the exclude-file hash separately so rule changes get
//! their own (longer) debounce window before triggering a rescan.

use crate::exclude::{ExcludeMatcher, ExcludeState};
use crate::watcher::{ChangeKind, FileChange, FileWatcher, WatchError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DebounceConfig {
  /// Debounce delay for file changes.
  pub file_debounce_ms: u64,
  /// Debounce delay for exclude-file changes.
  pub exclude_debounce_ms: u64,
  /// Maximum events to collect before forcing a flush.
  pub max_pending_events: usize,
}

impl Default for DebounceConfig {
  fn default() -> Self {
    Self {
      file_debounce_ms: 500,
      exclude_debounce_ms: 1000,
      max_pending_events: 100,
    }
  }
}

#[derive(Debug, Clone)]
struct PendingChange {
  kind: ChangeKind,
  last_seen: Instant,
}

impl PendingChange {
  fn new(kind: ChangeKind) -> Self {
    Self {
      kind,
      last_seen: Instant::now(),
    }
  }

  fn update(&mut self, kind: ChangeKind) {
    self.last_seen = Instant::now();
    self.kind = match (self.kind, kind) {
      // Add followed by a change is still an add.
      (ChangeKind::Add, ChangeKind::Change) => ChangeKind::Add,
      // Unlink followed by an add is a change (the file came back).
      (ChangeKind::Unlink, ChangeKind::Add) => ChangeKind::Change,
      // Add followed by unlink cancels out to unlink.
      (ChangeKind::Add, ChangeKind::Unlink) => ChangeKind::Unlink,
      _ => kind,
    };
  }
}

/// Batches and deduplicates events from one [`FileWatcher`]. Events for a
/// path matching `exclude_patterns` are dropped in [`Self::handle_change`]
/// before they ever enter the pending map.
pub struct DebouncedWatcher {
  watcher: FileWatcher,
  config: DebounceConfig,
  pending: HashMap<PathBuf, PendingChange>,
  exclude_state: Option<ExcludeState>,
  exclude_last_change: Option<Instant>,
  exclude_patterns: ExcludeMatcher,
}

impl DebouncedWatcher {
  pub fn new(root: &Path, config: DebounceConfig) -> Result<Self, WatchError> {
    Self::with_excludes(root, config, &[])
  }

  pub fn with_excludes(root: &Path, config: DebounceConfig, exclude_patterns: &[String]) -> Result<Self, WatchError> {
    let watcher = FileWatcher::new(root)?;
    let exclude_state = ExcludeState::load(root).ok();

    Ok(Self {
      watcher,
      config,
      pending: HashMap::new(),
      exclude_state,
      exclude_last_change: None,
      exclude_patterns: ExcludeMatcher::new(exclude_patterns),
    })
  }

  pub fn with_defaults(root: &Path) -> Result<Self, WatchError> {
    Self::new(root, DebounceConfig::default())
  }

  pub fn root(&self) -> &Path {
    self.watcher.root()
  }

  pub fn poll_raw(&mut self) {
    while let Some(change) = self.watcher.poll() {
      self.handle_change(change);
    }
  }

  /// Collect changes whose debounce window has elapsed.
  pub fn collect_ready(&mut self) -> Vec<FileChange> {
    self.poll_raw();

    let now = Instant::now();
    let debounce_duration = Duration::from_millis(self.config.file_debounce_ms);

    let mut ready = Vec::new();
    let mut to_remove = Vec::new();

    for (path, pending) in &self.pending {
      if now.duration_since(pending.last_seen) >= debounce_duration {
        ready.push(FileChange {
          path: path.clone(),
          kind: pending.kind,
        });
        to_remove.push(path.clone());
      }
    }

    for path in to_remove {
      self.pending.remove(&path);
    }

    ready
  }

  /// Force-collect every pending change regardless of debounce time.
  pub fn collect_all(&mut self) -> Vec<FileChange> {
    self.poll_raw();
    self
      .pending
      .drain()
      .map(|(path, pending)| FileChange { path, kind: pending.kind })
      .collect()
  }

  /// Checks whether the exclude rules changed, itself debounced so a burst
  /// of edits to `.gitignore`/`.docdexignore` only triggers one rescan.
  pub fn check_exclude_change(&mut self) -> bool {
    let now = Instant::now();

    if let Some(last_change) = self.exclude_last_change
      && now.duration_since(last_change) < Duration::from_millis(self.config.exclude_debounce_ms)
    {
      return false;
    }

    let root = self.watcher.root().to_path_buf();
    if let Ok(new_state) = ExcludeState::load(&root) {
      if let Some(ref old_state) = self.exclude_state {
        if new_state.hash != old_state.hash {
          debug!(old = %old_state.hash, new = %new_state.hash, "exclude rules changed");
          self.exclude_state = Some(new_state);
          self.exclude_last_change = Some(now);
          return true;
        }
      } else {
        self.exclude_state = Some(new_state);
      }
    }

    false
  }

  pub fn exclude_state(&self) -> Option<&ExcludeState> {
    self.exclude_state.as_ref()
  }

  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  pub fn should_force_flush(&self) -> bool {
    self.pending.len() >= self.config.max_pending_events
  }

  fn handle_change(&mut self, change: FileChange) {
    if change.path.file_name().is_some_and(|n| n == ".gitignore" || n == ".docdexignore") {
      // Reset so the next check_exclude_change call re-evaluates immediately.
      self.exclude_last_change = None;
      return;
    }

    let root = self.watcher.root();
    if self.exclude_patterns.is_match(change.path.strip_prefix(root).unwrap_or(&change.path)) {
      return;
    }

    if let Some(pending) = self.pending.get_mut(&change.path) {
      pending.update(change.kind);
    } else {
      self.pending.insert(change.path, PendingChange::new(change.kind));
    }
  }
}

/// Drives a [`DebouncedWatcher`] on a fixed interval, handing ready changes
/// to a caller-supplied handler.
pub struct BatchProcessor {
  watcher: DebouncedWatcher,
  batch_interval: Duration,
  last_batch: Instant,
}

impl BatchProcessor {
  pub fn new(watcher: DebouncedWatcher) -> Self {
    Self {
      watcher,
      batch_interval: Duration::from_secs(1),
      last_batch: Instant::now(),
    }
  }

  pub fn with_interval(watcher: DebouncedWatcher, interval: Duration) -> Self {
    Self {
      watcher,
      batch_interval: interval,
      last_batch: Instant::now(),
    }
  }

  pub fn process_batch<F>(&mut self, handler: F) -> Result<usize, WatchError>
  where
    F: FnMut(FileChange),
  {
    let now = Instant::now();

    if now.duration_since(self.last_batch) < self.batch_interval && !self.watcher.should_force_flush() {
      return Ok(0);
    }

    let changes = if self.watcher.should_force_flush() {
      self.watcher.collect_all()
    } else {
      self.watcher.collect_ready()
    };

    let count = changes.len();
    changes.into_iter().for_each(handler);

    self.last_batch = now;
    Ok(count)
  }

  pub fn check_exclude_change(&mut self) -> bool {
    self.watcher.check_exclude_change()
  }

  pub fn watcher(&self) -> &DebouncedWatcher {
    &self.watcher
  }

  pub fn watcher_mut(&mut self) -> &mut DebouncedWatcher {
    &mut self.watcher
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn debounce_config_defaults() {
    let config = DebounceConfig::default();
    assert_eq!(config.file_debounce_ms, 500);
    assert_eq!(config.exclude_debounce_ms, 1000);
    assert_eq!(config.max_pending_events, 100);
  }

  #[test]
  fn pending_change_coalescing() {
    let mut pending = PendingChange::new(ChangeKind::Add);
    pending.update(ChangeKind::Change);
    assert_eq!(pending.kind, ChangeKind::Add);

    let mut pending = PendingChange::new(ChangeKind::Unlink);
    pending.update(ChangeKind::Add);
    assert_eq!(pending.kind, ChangeKind::Change);

    let mut pending = PendingChange::new(ChangeKind::Add);
    pending.update(ChangeKind::Unlink);
    assert_eq!(pending.kind, ChangeKind::Unlink);
  }

  #[test]
  fn debounced_watcher_creation() {
    let dir = TempDir::new().unwrap();
    assert!(DebouncedWatcher::with_defaults(dir.path()).is_ok());
  }

  #[test]
  fn debounced_watcher_collect_ready_empty_when_nothing_changed() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("test.txt"), "hello").unwrap();

    let mut watcher = DebouncedWatcher::new(
      dir.path(),
      DebounceConfig {
        file_debounce_ms: 50,
        ..Default::default()
      },
    )
    .unwrap();

    assert_eq!(watcher.pending_count(), 0);
    std::thread::sleep(Duration::from_millis(100));
    assert!(watcher.collect_ready().is_empty());
  }

  #[test]
  fn handle_change_drops_excluded_paths_before_pending() {
    let dir = TempDir::new().unwrap();
    let mut watcher = DebouncedWatcher::with_excludes(dir.path(), DebounceConfig::default(), &["*.log".to_string()]).unwrap();

    watcher.handle_change(FileChange { path: dir.path().join("debug.log"), kind: ChangeKind::Add });
    assert_eq!(watcher.pending_count(), 0);

    watcher.handle_change(FileChange { path: dir.path().join("notes.txt"), kind: ChangeKind::Add });
    assert_eq!(watcher.pending_count(), 1);
  }

  #[test]
  fn exclude_change_detection() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".gitignore"), "*.log").unwrap();

    let mut watcher = DebouncedWatcher::new(
      dir.path(),
      DebounceConfig {
        exclude_debounce_ms: 50,
        ..Default::default()
      },
    )
    .unwrap();

    assert!(!watcher.check_exclude_change());

    fs::write(dir.path().join(".gitignore"), "*.log\n*.tmp").unwrap();
    std::thread::sleep(Duration::from_millis(100));

    assert!(watcher.check_exclude_change());
  }

  #[test]
  fn should_force_flush_past_threshold() {
    let dir = TempDir::new().unwrap();
    let mut watcher = DebouncedWatcher::new(
      dir.path(),
      DebounceConfig {
        max_pending_events: 5,
        ..Default::default()
      },
    )
    .unwrap();

    for i in 0..5 {
      watcher.pending.insert(PathBuf::from(format!("/test/{i}.txt")), PendingChange::new(ChangeKind::Change));
    }

    assert!(watcher.should_force_flush());
  }

  #[test]
  fn batch_processor_processes_pending_changes() {
    let dir = TempDir::new().unwrap();
    let watcher = DebouncedWatcher::new(
      dir.path(),
      DebounceConfig {
        file_debounce_ms: 50,
        ..Default::default()
      },
    )
    .unwrap();

    let mut processor = BatchProcessor::with_interval(watcher, Duration::from_millis(50));

    for i in 0..3 {
      processor
        .watcher_mut()
        .pending
        .insert(PathBuf::from(format!("/test/{i}.txt")), PendingChange::new(ChangeKind::Change));
    }

    std::thread::sleep(Duration::from_millis(100));

    let mut processed = Vec::new();
    let count = processor.process_batch(|change| processed.push(change)).unwrap();

    assert_eq!(count, 3);
    assert_eq!(processed.len(), 3);
  }
}
