//! Config Store: persists watched roots, exclude patterns, enabled
//! extensions and batch sizes to a single JSON file in the user data
//! directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuThrottle {
  Low,
  Medium,
  High,
}

impl Default for CpuThrottle {
  fn default() -> Self {
    Self::Medium
  }
}

impl CpuThrottle {
  /// `cpuThrottle` governs how aggressively the daemon competes for CPU:
  /// it drives both the embedding queue's concurrent-batch ceiling and the
  /// watcher's poll interval.
  pub fn max_concurrent_batches(&self) -> usize {
    match self {
      CpuThrottle::Low => 1,
      CpuThrottle::Medium => 2,
      CpuThrottle::High => 4,
    }
  }

  pub fn watcher_poll_interval_ms(&self) -> u64 {
    match self {
      CpuThrottle::Low => 2000,
      CpuThrottle::Medium => 1000,
      CpuThrottle::High => 250,
    }
  }
}

fn default_embedding_batch_size() -> usize {
  32
}
fn default_max_tokens_per_batch() -> usize {
  8000
}
fn default_max_queue_size() -> usize {
  1000
}
fn default_backpressure_threshold() -> usize {
  800
}
fn default_embedder_port() -> u16 {
  crate::paths::default_embedder_port()
}
fn default_max_file_size_bytes() -> u64 {
  50 * 1024 * 1024
}
fn default_max_retries() -> usize {
  3
}
fn default_file_types() -> HashMap<String, bool> {
  let mut m = HashMap::new();
  m.insert("txt".to_string(), true);
  m.insert("md".to_string(), true);
  m
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub watched_folders: Vec<PathBuf>,
  #[serde(default)]
  pub exclude_patterns: Vec<String>,
  #[serde(default = "default_file_types")]
  pub file_types: HashMap<String, bool>,
  #[serde(default = "default_embedding_batch_size")]
  pub embedding_batch_size: usize,
  #[serde(default = "default_max_tokens_per_batch")]
  pub max_tokens_per_batch: usize,
  #[serde(default = "default_max_queue_size")]
  pub max_queue_size: usize,
  #[serde(default = "default_backpressure_threshold")]
  pub backpressure_threshold: usize,
  #[serde(default = "default_embedder_port")]
  pub embedder_port: u16,
  #[serde(default)]
  pub cpu_throttle: CpuThrottle,
  #[serde(default = "default_max_file_size_bytes")]
  pub max_file_size_bytes: u64,
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      watched_folders: Vec::new(),
      exclude_patterns: Vec::new(),
      file_types: default_file_types(),
      embedding_batch_size: default_embedding_batch_size(),
      max_tokens_per_batch: default_max_tokens_per_batch(),
      max_queue_size: default_max_queue_size(),
      backpressure_threshold: default_backpressure_threshold(),
      embedder_port: default_embedder_port(),
      cpu_throttle: CpuThrottle::default(),
      max_file_size_bytes: default_max_file_size_bytes(),
      max_retries: default_max_retries() as u32,
    }
  }
}

impl Config {
  pub fn is_extension_enabled(&self, ext: &str) -> bool {
    self.file_types.get(&ext.to_lowercase()).copied().unwrap_or(false)
  }
}

/// Partial settings update, as accepted by `updateSettings`. Every field is
/// optional; present fields overwrite the corresponding `Config` field.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SettingsUpdate {
  pub exclude_patterns: Option<Vec<String>>,
  pub file_types: Option<HashMap<String, bool>>,
  pub embedding_batch_size: Option<usize>,
  pub max_tokens_per_batch: Option<usize>,
  pub max_queue_size: Option<usize>,
  pub backpressure_threshold: Option<usize>,
  pub embedder_port: Option<u16>,
  pub cpu_throttle: Option<CpuThrottle>,
  pub max_file_size_bytes: Option<u64>,
  pub max_retries: Option<u32>,
}

/// Owns the on-disk `config.json` and serves/persists the [`Config`].
///
/// Mutation serialization is the Orchestrator's job (single task runner);
/// this type itself performs no internal locking.
pub struct ConfigStore {
  path: PathBuf,
  config: Config,
}

impl ConfigStore {
  /// Load from `path`, falling back to defaults (merged with whatever
  /// partial JSON is present) when the file is missing or invalid.
  pub fn load(path: PathBuf) -> Result<Self> {
    let config = match std::fs::read_to_string(&path) {
      Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
      Err(_) => Config::default(),
    };
    let store = Self { path, config };
    store.persist()?;
    Ok(store)
  }

  pub fn get(&self) -> &Config {
    &self.config
  }

  pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<()> {
    if let Some(v) = update.exclude_patterns {
      self.config.exclude_patterns = v;
    }
    if let Some(v) = update.file_types {
      self.config.file_types = v;
    }
    if let Some(v) = update.embedding_batch_size {
      self.config.embedding_batch_size = v;
    }
    if let Some(v) = update.max_tokens_per_batch {
      self.config.max_tokens_per_batch = v;
    }
    if let Some(v) = update.max_queue_size {
      self.config.max_queue_size = v;
    }
    if let Some(v) = update.backpressure_threshold {
      self.config.backpressure_threshold = v;
    }
    if let Some(v) = update.embedder_port {
      self.config.embedder_port = v;
    }
    if let Some(v) = update.cpu_throttle {
      self.config.cpu_throttle = v;
    }
    if let Some(v) = update.max_file_size_bytes {
      self.config.max_file_size_bytes = v;
    }
    if let Some(v) = update.max_retries {
      self.config.max_retries = v;
    }
    self.persist()
  }

  pub fn set_watched_folders(&mut self, folders: Vec<PathBuf>) -> Result<()> {
    self.config.watched_folders = folders;
    self.persist()
  }

  fn persist(&self) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&self.config).map_err(Error::from)?;
    std::fs::write(&self.path, json)?;
    Ok(())
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let store = ConfigStore::load(dir.path().join("config.json")).unwrap();
    assert!(store.get().watched_folders.is_empty());
    assert_eq!(store.get().embedding_batch_size, 32);
  }

  #[test]
  fn persists_on_mutation_and_reloads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    {
      let mut store = ConfigStore::load(path.clone()).unwrap();
      store.set_watched_folders(vec![PathBuf::from("/docs")]).unwrap();
    }
    let reloaded = ConfigStore::load(path).unwrap();
    assert_eq!(reloaded.get().watched_folders, vec![PathBuf::from("/docs")]);
  }

  #[test]
  fn partial_old_config_is_migrated_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"watchedFolders": []}"#).unwrap();
    // unrecognized/camelCase keys are ignored by serde's field matching;
    // defaults fill in every recognized field.
    let store = ConfigStore::load(path).unwrap();
    assert_eq!(store.get().embedding_batch_size, 32);
    assert_eq!(store.get().max_queue_size, 1000);
  }

  #[test]
  fn update_settings_overwrites_only_present_fields() {
    let dir = TempDir::new().unwrap();
    let mut store = ConfigStore::load(dir.path().join("config.json")).unwrap();
    store
      .update_settings(SettingsUpdate {
        max_queue_size: Some(50),
        ..Default::default()
      })
      .unwrap();
    assert_eq!(store.get().max_queue_size, 50);
    assert_eq!(store.get().embedding_batch_size, 32);
  }

  #[test]
  fn cpu_throttle_maps_to_concurrency() {
    assert_eq!(CpuThrottle::Low.max_concurrent_batches(), 1);
    assert_eq!(CpuThrottle::Medium.max_concurrent_batches(), 2);
    assert_eq!(CpuThrottle::High.max_concurrent_batches(), 4);
  }
}
