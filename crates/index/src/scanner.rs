//! Full-tree scan: the startup sweep (and `reindexAll`) that walks a watched
//! folder and produces one [`ScannedFile`] per file the `ParserRegistry`
//! recognizes and `Config` currently allows, honoring `.gitignore`,
//! a project-local `.docdexignore`, and `Config::exclude_patterns`.

use crate::exclude::ExcludeMatcher;
use ignore::WalkBuilder;
use indexer_core::{Config, ParserRegistry};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("walk error: {0}")]
  Walk(#[from] ignore::Error),
}

/// Result of scanning a single file.
#[derive(Debug, Clone)]
pub struct ScannedFile {
  pub path: PathBuf,
  pub relative_path: String,
  pub size: u64,
  pub mtime_ms: u64,
}

/// Result of scanning a directory.
#[derive(Debug)]
pub struct ScanResult {
  pub files: Vec<ScannedFile>,
  pub skipped_count: u32,
  pub total_bytes: u64,
  pub scan_duration: Duration,
}

/// Progress callback data.
#[derive(Debug, Clone)]
pub struct ScanProgress {
  pub scanned: u32,
  pub path: PathBuf,
}

/// Walks a folder in parallel, filtering to extensions the parser registry
/// supports and respecting `.gitignore`/`.docdexignore`.
pub struct Scanner {
  max_file_size: u64,
  follow_links: bool,
}

impl Default for Scanner {
  fn default() -> Self {
    Self::new()
  }
}

impl Scanner {
  pub fn new() -> Self {
    Self {
      max_file_size: 50 * 1024 * 1024, // 50MB, matches Config::max_file_size_bytes default
      follow_links: false,
    }
  }

  pub fn with_max_file_size(mut self, size: u64) -> Self {
    self.max_file_size = size;
    self
  }

  pub fn scan<F>(&self, root: &Path, registry: &ParserRegistry, config: &Config, progress: F) -> ScanResult
  where
    F: Fn(ScanProgress) + Send + Sync,
  {
    let start = Instant::now();
    let scanned = AtomicU32::new(0);
    let skipped = AtomicU32::new(0);
    let total_bytes = AtomicU64::new(0);
    let exclude = ExcludeMatcher::new(&config.exclude_patterns);

    let walker = WalkBuilder::new(root)
      .follow_links(self.follow_links)
      .hidden(true)
      .git_ignore(true)
      .git_global(true)
      .git_exclude(true)
      .add_custom_ignore_filename(".docdexignore")
      .build();

    // par_bridge avoids collecting the walk first, which matters once a
    // watched folder has well over 100k entries.
    let files: Vec<ScannedFile> = walker
      .filter_map(|e| e.ok())
      .par_bridge()
      .filter_map(|entry| {
        let path = entry.path();

        if entry.file_type().is_none_or(|ft| ft.is_dir()) {
          return None;
        }

        let count = scanned.fetch_add(1, Ordering::Relaxed);
        if count.is_multiple_of(100) {
          progress(ScanProgress {
            scanned: count,
            path: path.to_path_buf(),
          });
        }

        if exclude.is_match(path.strip_prefix(root).unwrap_or(path)) {
          return None;
        }

        let ext = path.extension()?.to_str()?;
        if !registry.supports(ext) || !config.is_extension_enabled(ext) {
          return None;
        }

        let metadata = entry.metadata().ok()?;
        if metadata.len() == 0 || metadata.len() > self.max_file_size {
          skipped.fetch_add(1, Ordering::Relaxed);
          return None;
        }

        let mtime_ms = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?.as_millis() as u64;
        total_bytes.fetch_add(metadata.len(), Ordering::Relaxed);

        Some(ScannedFile {
          path: path.to_path_buf(),
          relative_path: path.strip_prefix(root).ok()?.to_string_lossy().into(),
          size: metadata.len(),
          mtime_ms,
        })
      })
      .collect();

    ScanResult {
      files,
      skipped_count: skipped.load(Ordering::Relaxed),
      total_bytes: total_bytes.load(Ordering::Relaxed),
      scan_duration: start.elapsed(),
    }
  }

  pub fn scan_file(&self, path: &Path, root: &Path, registry: &ParserRegistry, config: &Config) -> Option<ScannedFile> {
    if ExcludeMatcher::new(&config.exclude_patterns).is_match(path.strip_prefix(root).unwrap_or(path)) {
      return None;
    }

    let ext = path.extension()?.to_str()?;
    if !registry.supports(ext) || !config.is_extension_enabled(ext) {
      return None;
    }

    let metadata = path.metadata().ok()?;
    if metadata.len() == 0 || metadata.len() > self.max_file_size {
      return None;
    }

    let mtime_ms = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?.as_millis() as u64;

    Some(ScannedFile {
      path: path.to_path_buf(),
      relative_path: path.strip_prefix(root).ok()?.to_string_lossy().into(),
      size: metadata.len(),
      mtime_ms,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry() -> ParserRegistry {
    ParserRegistry::default()
  }

  #[test]
  fn scan_finds_supported_extensions_only() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.md"), "# hi").unwrap();
    std::fs::write(dir.path().join("image.png"), [0u8; 10]).unwrap();

    let scanner = Scanner::new();
    let result = scanner.scan(dir.path(), &registry(), &Config::default(), |_| {});

    assert_eq!(result.files.len(), 1);
    assert!(result.files[0].relative_path.ends_with("notes.md"));
  }

  #[test]
  fn scan_respects_gitignore() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join(".git")).unwrap();
    std::fs::write(dir.path().join(".gitignore"), "ignored/\n").unwrap();
    std::fs::write(dir.path().join("keep.txt"), "hello").unwrap();
    std::fs::create_dir(dir.path().join("ignored")).unwrap();
    std::fs::write(dir.path().join("ignored/skip.txt"), "skip").unwrap();

    let scanner = Scanner::new();
    let result = scanner.scan(dir.path(), &registry(), &Config::default(), |_| {});

    assert_eq!(result.files.len(), 1);
    assert!(result.files[0].relative_path.contains("keep.txt"));
  }

  #[test]
  fn scan_respects_docdexignore() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join(".docdexignore"), "private.txt\n").unwrap();
    std::fs::write(dir.path().join("private.txt"), "secret").unwrap();
    std::fs::write(dir.path().join("public.txt"), "hello").unwrap();

    let scanner = Scanner::new();
    let result = scanner.scan(dir.path(), &registry(), &Config::default(), |_| {});

    assert_eq!(result.files.len(), 1);
    assert!(result.files[0].relative_path.contains("public.txt"));
  }

  #[test]
  fn scan_skips_oversized_files() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("small.txt"), "x").unwrap();
    std::fs::write(dir.path().join("large.txt"), "x".repeat(2048)).unwrap();

    let scanner = Scanner::new().with_max_file_size(1024);
    let result = scanner.scan(dir.path(), &registry(), &Config::default(), |_| {});

    assert_eq!(result.files.len(), 1);
    assert!(result.files[0].relative_path.contains("small.txt"));
    assert_eq!(result.skipped_count, 1);
  }

  #[test]
  fn scan_skips_empty_files() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("normal.txt"), "text").unwrap();
    std::fs::write(dir.path().join("empty.txt"), "").unwrap();

    let scanner = Scanner::new();
    let result = scanner.scan(dir.path(), &registry(), &Config::default(), |_| {});

    assert_eq!(result.files.len(), 1);
    assert!(result.files[0].relative_path.contains("normal.txt"));
  }

  #[test]
  fn scan_respects_exclude_patterns() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("keep.md"), "# hi").unwrap();
    std::fs::write(dir.path().join("draft.md"), "# wip").unwrap();

    let config = Config { exclude_patterns: vec!["draft.*".to_string()], ..Config::default() };
    let scanner = Scanner::new();
    let result = scanner.scan(dir.path(), &registry(), &config, |_| {});

    assert_eq!(result.files.len(), 1);
    assert!(result.files[0].relative_path.contains("keep.md"));
  }

  #[test]
  fn scan_skips_disabled_file_types() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.md"), "# hi").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();

    let mut file_types = std::collections::HashMap::new();
    file_types.insert("txt".to_string(), true);
    file_types.insert("md".to_string(), false);
    let config = Config { file_types, ..Config::default() };

    let scanner = Scanner::new();
    let result = scanner.scan(dir.path(), &registry(), &config, |_| {});

    assert_eq!(result.files.len(), 1);
    assert!(result.files[0].relative_path.contains("notes.txt"));
  }
}
