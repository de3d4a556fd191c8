//! `docdex search` / `docdex files` / `docdex stats`

use crate::client;
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct SearchParams {
  q: String,
  k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct QueryHit {
  path: String,
  page: i64,
  #[allow(dead_code)]
  offset: i64,
  text: String,
  score: f32,
  title: String,
}

pub async fn cmd_search(query: String, k: Option<usize>, json: bool) -> Result<()> {
  let mut conn = client::connect().await?;
  let hits: Vec<QueryHit> = client::call(&mut conn, "search", SearchParams { q: query, k }).await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&hits)?);
    return Ok(());
  }

  if hits.is_empty() {
    println!("no results");
    return Ok(());
  }

  for (i, hit) in hits.iter().enumerate() {
    let snippet: String = hit.text.chars().take(160).collect();
    let page_suffix = if hit.page > 0 { format!(" (page {})", hit.page) } else { String::new() };
    println!("{}. {}{}  [score {:.3}]", i + 1, hit.title, page_suffix, hit.score);
    println!("   {}", hit.path);
    println!("   {}", snippet.replace('\n', " "));
    println!();
  }
  Ok(())
}

#[derive(Serialize)]
struct SearchFilesParams {
  query: String,
}

pub async fn cmd_files(query: String) -> Result<()> {
  let mut conn = client::connect().await?;
  let paths: Vec<String> = client::call(&mut conn, "searchFiles", SearchFilesParams { query }).await?;
  if paths.is_empty() {
    println!("no matching files");
    return Ok(());
  }
  for path in paths {
    println!("{}", path);
  }
  Ok(())
}

pub async fn cmd_stats() -> Result<()> {
  let mut conn = client::connect().await?;
  let stats: serde_json::Value = client::call(&mut conn, "stats", serde_json::json!({})).await?;
  println!("total chunks:  {}", stats["totalChunks"]);
  println!("total files:   {}", stats["totalFiles"]);
  println!("indexed files: {}", stats["indexedFiles"]);
  println!("failed files:  {}", stats["failedFiles"]);
  println!("queued files:  {}", stats["queuedFiles"]);
  Ok(())
}
