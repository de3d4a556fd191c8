//! `docdex watch` / `docdex folders` — thin wrappers over the daemon's
//! `watchStart` / `getWatchedFolders` RPCs.

use crate::client;
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct WatchStartParams {
  roots: Vec<PathBuf>,
  options: Option<WatchOptions>,
}

#[derive(Serialize)]
struct WatchOptions {
  exclude: Vec<String>,
}

pub async fn cmd_watch(roots: Vec<PathBuf>, exclude: Vec<String>) -> Result<()> {
  let roots: Vec<PathBuf> = roots
    .into_iter()
    .map(|p| std::fs::canonicalize(&p).unwrap_or(p))
    .collect();

  let mut conn = client::connect().await?;
  let params = WatchStartParams {
    roots,
    options: if exclude.is_empty() { None } else { Some(WatchOptions { exclude }) },
  };
  let result: serde_json::Value = client::call(&mut conn, "watchStart", params).await?;

  println!("watching:");
  if let Some(folders) = result["folders"].as_array() {
    for folder in folders {
      println!("  {}", folder.as_str().unwrap_or_default());
    }
  }
  Ok(())
}

pub async fn cmd_folders() -> Result<()> {
  let mut conn = client::connect().await?;
  let result: serde_json::Value = client::call(&mut conn, "getWatchedFolders", serde_json::json!({})).await?;
  if let Some(folders) = result["folders"].as_array() {
    if folders.is_empty() {
      println!("no folders are being watched");
    }
    for folder in folders {
      println!("{}", folder.as_str().unwrap_or_default());
    }
  }
  Ok(())
}
