pub mod debounce;
pub mod exclude;
pub mod queue;
pub mod scanner;
pub mod watcher;

pub use debounce::{BatchProcessor, DebounceConfig, DebouncedWatcher};
pub use exclude::{ExcludeMatcher, ExcludeState, compute_exclude_hash, should_ignore};
pub use queue::{WorkQueue, reconcile_and_enqueue};
pub use scanner::{ScanError, ScanProgress, ScanResult, ScannedFile, Scanner};
pub use watcher::{ChangeKind, FileChange, FileWatcher, WatchError};
