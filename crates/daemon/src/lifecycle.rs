//! Daemon lifecycle: owns the `Orchestrator`'s startup, wires it to the
//! `Router`/`Server`, and drives the process to a clean shutdown on
//! ctrl-c or an RPC `shutdown` call.
//!
//! `Daemon::run` walks a sequential startup (open the orchestrator, bind
//! the socket, install the ctrl-c handler) rather than a background-task
//! scheduler, since the Orchestrator already spawns its own watcher and
//! sidecar-recovery tasks once `Orchestrator::start` returns.

use crate::router::Router;
use crate::server::{Server, ShutdownHandle};
use embedding::sidecar::SidecarConfig;
use pipeline::Orchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum LifecycleError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("server error: {0}")]
  Server(#[from] crate::server::ServerError),
  #[error("orchestrator error: {0}")]
  Orchestrator(#[from] pipeline::OrchestratorError),
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
  /// Socket path for IPC.
  pub socket_path: PathBuf,
  /// Root data directory (`config.json`, `data/`, `logs/`).
  pub data_dir: PathBuf,
  /// Embedder sidecar process + transport configuration.
  pub sidecar: SidecarConfig,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      socket_path: crate::server::default_socket_path(),
      data_dir: indexer_core::paths::default_data_dir(),
      sidecar: SidecarConfig::default(),
    }
  }
}

/// Daemon lifecycle manager: boots the `Orchestrator` through its `INIT →
/// ... → READY` state machine, then serves the Unix-socket command
/// surface until a shutdown is requested.
pub struct Daemon {
  config: DaemonConfig,
  orchestrator: Option<Arc<Orchestrator>>,
  shutdown: Option<ShutdownHandle>,
}

impl Daemon {
  pub fn new(config: DaemonConfig) -> Self {
    Self { config, orchestrator: None, shutdown: None }
  }

  /// Run the daemon to completion: boots the orchestrator, binds the
  /// socket, and blocks until a shutdown signal (ctrl-c or RPC) arrives.
  pub async fn run(&mut self) -> Result<(), LifecycleError> {
    info!("starting docdex daemon");
    info!(socket = ?self.config.socket_path, data_dir = ?self.config.data_dir, "daemon configuration");

    let orchestrator = Orchestrator::start(self.config.data_dir.clone(), self.config.sidecar.clone()).await?;
    self.orchestrator = Some(orchestrator.clone());

    let router = Arc::new(Router::new(orchestrator.clone()));
    let server = Server::with_socket_path(router.clone(), self.config.socket_path.clone());
    let shutdown = server.shutdown_handle();
    self.shutdown = Some(shutdown.clone());
    router.set_shutdown_handle(shutdown.clone()).await;

    // ctrl-c also drives the orchestrator through its SHUTTING_DOWN state
    // rather than just killing the listener.
    let shutdown_clone = shutdown.clone();
    let orchestrator_for_signal = orchestrator.clone();
    tokio::spawn(async move {
      if let Err(err) = signal::ctrl_c().await {
        warn!(%err, "failed to listen for ctrl-c");
        return;
      }
      info!("received ctrl-c, shutting down");
      orchestrator_for_signal.shutdown().await;
      shutdown_clone.shutdown();
    });

    server.run().await?;
    info!("daemon shutdown complete");
    Ok(())
  }

  /// Request shutdown from outside the `run` loop (e.g. a signal handler
  /// installed by the caller).
  pub fn shutdown(&self) {
    if let Some(ref shutdown) = self.shutdown {
      shutdown.shutdown();
    }
  }

  pub fn orchestrator(&self) -> Option<Arc<Orchestrator>> {
    self.orchestrator.clone()
  }
}

/// Check whether a daemon is already listening on `socket_path`.
pub fn is_running(socket_path: &std::path::Path) -> bool {
  std::os::unix::net::UnixStream::connect(socket_path).is_ok()
}

/// Get the PID file path used by the background-spawn CLI path.
pub fn pid_file_path() -> PathBuf {
  if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
    PathBuf::from(runtime_dir).join("docdex.pid")
  } else {
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/docdex-{}.pid", uid))
  }
}

/// Write the current process's PID file.
pub fn write_pid_file() -> Result<(), std::io::Error> {
  let pid_path = pid_file_path();
  std::fs::write(&pid_path, std::process::id().to_string())
}

/// Remove the PID file.
pub fn remove_pid_file() {
  let pid_path = pid_file_path();
  let _ = std::fs::remove_file(pid_path);
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_default_config() {
    let config = DaemonConfig::default();
    assert!(!config.socket_path.to_string_lossy().is_empty());
  }

  #[test]
  fn test_is_running_no_socket() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("nonexistent.sock");
    assert!(!is_running(&socket_path));
  }
}
