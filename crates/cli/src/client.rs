//! Thin JSON-RPC convenience wrapper over `daemon::Client`, shared by every
//! command. There is no per-project auto-start here: `docdex daemon` is the
//! one process serving the whole data directory, so `connect` just dials
//! the socket and tells the caller how to start it if nothing answers.

use anyhow::{Context, Result, bail};
use daemon::{Client, default_socket_path};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub async fn connect() -> Result<Client> {
  let socket_path = default_socket_path();
  Client::connect_to(&socket_path)
    .await
    .with_context(|| format!("failed to connect to the docdex daemon at {:?}; start it with `docdex daemon`", socket_path))
}

/// Call `method` with `params`, decoding the result as `T` and turning an
/// RPC-level error into an `anyhow` error carrying the error code.
pub async fn call<P: Serialize, T: DeserializeOwned>(client: &mut Client, method: &str, params: P) -> Result<T> {
  let response = client.call(method, serde_json::to_value(params)?).await?;
  if let Some(err) = response.error {
    bail!("{} ({})", err.message, err.code);
  }
  let result = response.result.context("daemon returned no result")?;
  Ok(serde_json::from_value(result)?)
}
