//! `docdex enqueue` / `docdex reindex` / `docdex pause` / `docdex resume`

use crate::client;
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct EnqueueParams {
  paths: Vec<PathBuf>,
}

pub async fn cmd_enqueue(paths: Vec<PathBuf>) -> Result<()> {
  let paths: Vec<PathBuf> = paths.into_iter().map(|p| std::fs::canonicalize(&p).unwrap_or(p)).collect();
  let mut conn = client::connect().await?;
  let result: serde_json::Value = client::call(&mut conn, "enqueue", EnqueueParams { paths }).await?;
  println!("enqueued {} file(s)", result["enqueued"]);
  Ok(())
}

pub async fn cmd_reindex() -> Result<()> {
  let mut conn = client::connect().await?;
  let result: serde_json::Value = client::call(&mut conn, "reindexAll", serde_json::json!({})).await?;
  println!("re-queued {} file(s) for indexing", result["enqueued"]);
  Ok(())
}

pub async fn cmd_pause() -> Result<()> {
  let mut conn = client::connect().await?;
  let _: serde_json::Value = client::call(&mut conn, "pause", serde_json::json!({})).await?;
  println!("indexing paused");
  Ok(())
}

pub async fn cmd_resume() -> Result<()> {
  let mut conn = client::connect().await?;
  let _: serde_json::Value = client::call(&mut conn, "resume", serde_json::json!({})).await?;
  println!("indexing resumed");
  Ok(())
}
