//! `docdex daemon` / `docdex stop` / `docdex status`

use crate::client;
use crate::logging::init_daemon_logging;
use anyhow::{Context, Result};
use daemon::{Daemon, DaemonConfig, is_running};
use tracing::info;

/// Start the daemon. In foreground mode this call never returns until the
/// daemon shuts down; otherwise it re-execs itself detached with
/// `--foreground` and returns immediately.
pub async fn cmd_daemon(foreground: bool) -> Result<()> {
  let socket_path = daemon::default_socket_path();

  if is_running(&socket_path) {
    anyhow::bail!("daemon is already running at {:?}", socket_path);
  }

  if foreground {
    let _guard = init_daemon_logging(true);
    let config = DaemonConfig { socket_path, ..DaemonConfig::default() };
    let mut daemon = Daemon::new(config);
    daemon.run().await.context("daemon exited with an error")?;
    return Ok(());
  }

  let exe = std::env::current_exe().context("resolving current executable path")?;
  let data_dir = indexer_core::paths::default_data_dir();
  std::fs::create_dir_all(&data_dir)?;

  let log_path = indexer_core::paths::logs_dir(&data_dir).join("daemon.stdout.log");
  std::fs::create_dir_all(log_path.parent().unwrap())?;
  let log_file = std::fs::File::create(&log_path)?;

  let child = std::process::Command::new(exe)
    .arg("daemon")
    .arg("--foreground")
    .stdin(std::process::Stdio::null())
    .stdout(std::process::Stdio::from(log_file.try_clone()?))
    .stderr(std::process::Stdio::from(log_file))
    .spawn()
    .context("spawning background daemon process")?;

  info!(pid = child.id(), "daemon started in background");
  println!("docdex daemon started (pid {})", child.id());
  println!("socket: {:?}", socket_path);
  Ok(())
}

pub async fn cmd_stop() -> Result<()> {
  let socket_path = daemon::default_socket_path();
  if !is_running(&socket_path) {
    println!("daemon is not running");
    return Ok(());
  }

  let mut conn = client::connect().await?;
  let _: serde_json::Value = client::call(&mut conn, "shutdown", serde_json::json!({})).await?;
  println!("daemon stopping");
  Ok(())
}

pub async fn cmd_status() -> Result<()> {
  let socket_path = daemon::default_socket_path();
  if !is_running(&socket_path) {
    println!("daemon is not running");
    return Ok(());
  }

  let mut conn = client::connect().await?;
  let progress: serde_json::Value = client::call(&mut conn, "progress", serde_json::json!({})).await?;
  println!("state:      {}", progress["state"].as_str().unwrap_or("unknown"));
  println!("queued:     {}", progress["queued"]);
  println!("processing: {}", progress["processing"]);
  println!("processed:  {}", progress["processed"]);
  println!("failed:     {}", progress["failed"]);
  Ok(())
}
