//! Exclude-file tracking and default ignore rules ("gitignore-aware"
//! requirement, generalized to a folder of arbitrary documents rather than a
//! source checkout). `.gitignore` is honored when present for users who keep
//! their document folders under version control; `.docdexignore` lets anyone
//! else opt files out the same way. [`ExcludeState`] hashes both so the
//! watcher can tell when the rules themselves changed and a rescan is due.

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Hashes every exclude-file the scanner consults, so a change to any of
/// them (without a change to the files they govern) can still trigger a
/// rescan.
pub fn compute_exclude_hash(root: &Path) -> String {
  let mut hasher = Sha256::new();

  let files = [".gitignore", ".git/info/exclude", ".docdexignore"];
  for filename in files {
    if let Ok(content) = fs::read_to_string(root.join(filename)) {
      hasher.update(filename.as_bytes());
      hasher.update(b":");
      hasher.update(content.as_bytes());
      hasher.update(b"\n");
    }
  }

  // One level of nested .gitignore files, for performance.
  if let Ok(entries) = fs::read_dir(root) {
    for entry in entries.flatten() {
      if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
        let nested = entry.path().join(".gitignore");
        if let Ok(content) = fs::read_to_string(&nested) {
          let name = entry.file_name();
          hasher.update(name.to_string_lossy().as_bytes());
          hasher.update(b"/.gitignore:");
          hasher.update(content.as_bytes());
          hasher.update(b"\n");
        }
      }
    }
  }

  format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ExcludeState {
  pub hash: String,
  pub computed_at: chrono::DateTime<chrono::Utc>,
}

impl ExcludeState {
  pub fn new(root: &Path) -> Self {
    Self {
      hash: compute_exclude_hash(root),
      computed_at: chrono::Utc::now(),
    }
  }

  pub fn load(root: &Path) -> Result<Self, std::io::Error> {
    Ok(Self::new(root))
  }

  pub fn has_changed(&self, root: &Path) -> bool {
    compute_exclude_hash(root) != self.hash
  }
}

/// Extensions that mark a directory as an opaque OS bundle: it is a single
/// logical "file" to the user even though it's a directory tree on disk, and
/// its contents are never worth indexing individually.
const BUNDLE_EXTENSIONS: &[&str] = &["app", "framework", "bundle", "xcarchive", "photoslibrary"];

/// Exact filenames that are always OS/filesystem junk, never user content.
const JUNK_FILENAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", ".localized"];

/// Default ignore rules applied regardless of `excludePatterns`: opaque OS
/// bundles and filesystem junk files. This is a fallback for callers that
/// walk paths directly rather than through the `ignore`-crate-backed
/// [`crate::scanner::Scanner`], which additionally honors `.gitignore` and
/// `.docdexignore`.
pub fn should_ignore(path: &Path) -> bool {
  if path.file_name().is_some_and(|n| JUNK_FILENAMES.iter().any(|j| n == *j)) {
    return true;
  }

  path
    .ancestors()
    .any(|p| p.extension().and_then(|e| e.to_str()).is_some_and(|ext| BUNDLE_EXTENSIONS.contains(&ext)))
}

/// Compiled form of `Config::exclude_patterns`: user-supplied glob strings
/// matched against a path relative to the watched root. An invalid pattern
/// is skipped (logged), never fatal — one bad glob in the set shouldn't
/// disable watching altogether.
pub struct ExcludeMatcher {
  glob_set: GlobSet,
}

impl ExcludeMatcher {
  pub fn new(patterns: &[String]) -> Self {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
      match Glob::new(pattern) {
        Ok(glob) => {
          builder.add(glob);
        }
        Err(err) => warn!(pattern, %err, "skipping invalid exclude pattern"),
      }
    }
    let glob_set = builder.build().unwrap_or_else(|err| {
      warn!(%err, "failed to compile exclude patterns, excluding nothing");
      GlobSet::empty()
    });
    Self { glob_set }
  }

  pub fn is_match(&self, path: &Path) -> bool {
    self.glob_set.is_match(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn should_ignore_os_junk_files() {
    assert!(should_ignore(Path::new("notes/.DS_Store")));
    assert!(should_ignore(Path::new("Thumbs.db")));
  }

  #[test]
  fn should_ignore_opaque_bundles() {
    assert!(should_ignore(Path::new("Applications/Notes.app/Contents/Info.plist")));
    assert!(should_ignore(Path::new("Photos.photoslibrary/database/file.db")));
  }

  #[test]
  fn should_not_ignore_ordinary_documents() {
    assert!(!should_ignore(Path::new("docs/readme.md")));
    assert!(!should_ignore(Path::new("notes/todo.txt")));
  }

  #[test]
  fn compute_exclude_hash_is_stable_and_sensitive_to_content() {
    let dir = TempDir::new().unwrap();
    let hash_empty = compute_exclude_hash(dir.path());
    assert_eq!(hash_empty.len(), 64);

    fs::write(dir.path().join(".gitignore"), "*.log").unwrap();
    let hash_with_gitignore = compute_exclude_hash(dir.path());
    assert_ne!(hash_empty, hash_with_gitignore);

    fs::write(dir.path().join(".gitignore"), "*.tmp").unwrap();
    let hash_changed = compute_exclude_hash(dir.path());
    assert_ne!(hash_with_gitignore, hash_changed);
  }

  #[test]
  fn exclude_matcher_matches_glob_patterns() {
    let matcher = ExcludeMatcher::new(&["*.log".to_string(), "node_modules/**".to_string()]);
    assert!(matcher.is_match(Path::new("debug.log")));
    assert!(matcher.is_match(Path::new("node_modules/left-pad/index.js")));
    assert!(!matcher.is_match(Path::new("notes/readme.txt")));
  }

  #[test]
  fn exclude_matcher_tolerates_invalid_patterns() {
    let matcher = ExcludeMatcher::new(&["[".to_string(), "*.log".to_string()]);
    assert!(matcher.is_match(Path::new("debug.log")));
  }

  #[test]
  fn exclude_matcher_empty_patterns_matches_nothing() {
    let matcher = ExcludeMatcher::new(&[]);
    assert!(!matcher.is_match(Path::new("anything.txt")));
  }

  #[test]
  fn exclude_state_detects_change() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".docdexignore"), "private/").unwrap();
    let state = ExcludeState::new(dir.path());
    assert!(!state.has_changed(dir.path()));

    fs::write(dir.path().join(".docdexignore"), "private/\nscratch/").unwrap();
    assert!(state.has_changed(dir.path()));
  }
}
