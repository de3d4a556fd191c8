use std::path::PathBuf;

/// Root directory under which `config.json`, `data/` and `logs/` live.
///
/// Resolution order: `DATA_DIR` env var, then `XDG_DATA_HOME`, then
/// `dirs::data_dir()` joined with the app name.
pub fn default_data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("DATA_DIR") {
    return PathBuf::from(dir);
  }
  if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(dir).join("docdex");
  }
  dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("docdex")
}

pub fn config_path(data_dir: &std::path::Path) -> PathBuf {
  data_dir.join("config.json")
}

pub fn store_dir(data_dir: &std::path::Path) -> PathBuf {
  data_dir.join("data")
}

pub fn logs_dir(data_dir: &std::path::Path) -> PathBuf {
  data_dir.join("logs")
}

/// Default port the embedder sidecar binds to.
pub fn default_embedder_port() -> u16 {
  if let Ok(port) = std::env::var("EMBEDDER_PORT")
    && let Ok(parsed) = port.parse()
  {
    return parsed;
  }
  8421
}
