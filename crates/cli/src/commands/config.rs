//! `docdex config show` / `docdex config set`, backed by the daemon's
//! `getSettings` / `updateSettings` RPCs.

use crate::client;
use anyhow::Result;

pub async fn cmd_config_show() -> Result<()> {
  let mut conn = client::connect().await?;
  let settings: serde_json::Value = client::call(&mut conn, "getSettings", serde_json::json!({})).await?;
  println!("{}", serde_json::to_string_pretty(&settings)?);
  Ok(())
}

#[derive(Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSetArgs {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub embedding_batch_size: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_tokens_per_batch: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_queue_size: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub backpressure_threshold: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cpu_throttle: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_retries: Option<u32>,
}

pub async fn cmd_config_set(args: ConfigSetArgs) -> Result<()> {
  let mut conn = client::connect().await?;
  let settings: serde_json::Value = client::call(&mut conn, "updateSettings", args).await?;
  println!("settings updated:");
  println!("{}", serde_json::to_string_pretty(&settings)?);
  Ok(())
}
