//! Embedder Service Client: an HTTP client to a local, out-of-process
//! embedding server, plus the process supervision that spawns it, waits for
//! readiness, and respawns it with back-off if it dies.
//!
//! Uses a plain reqwest client over a fixed `/health`, `/info`, `/embed`
//! contract rather than any particular provider's proprietary API shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

use crate::provider::{EmbeddingError, EmbeddingProvider};
use crate::retry::{Classification, RetryPolicy, with_retry};

#[derive(Debug, Clone)]
pub struct SidecarConfig {
  pub port: u16,
  /// Path to the sidecar executable. `None` assumes it's already running
  /// (e.g. started out-of-band during development) and only the HTTP
  /// client is wired up.
  pub binary_path: Option<PathBuf>,
  pub model_id: Option<String>,
  pub startup_timeout: Duration,
  pub health_poll_interval: Duration,
  pub max_restarts: u32,
  pub request_timeout: Duration,
}

impl Default for SidecarConfig {
  fn default() -> Self {
    Self {
      port: indexer_core::paths::default_embedder_port(),
      binary_path: None,
      model_id: None,
      startup_timeout: Duration::from_secs(30),
      health_poll_interval: Duration::from_millis(250),
      max_restarts: 5,
      request_timeout: Duration::from_secs(30),
    }
  }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
  #[allow(dead_code)]
  status: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SidecarInfo {
  pub model_id: String,
  pub dim: usize,
  pub device: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
  texts: &'a [&'a str],
  normalize: bool,
  pooling: Option<&'a str>,
  batch_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
  vectors: Vec<Vec<f32>>,
}

/// The HTTP transport half of the Embedder Service Client. Cheap to clone
/// (wraps a pooled `reqwest::Client`).
#[derive(Debug, Clone)]
pub struct SidecarClient {
  client: reqwest::Client,
  base_url: String,
  model_id: String,
  dimensions: usize,
  retry_policy: RetryPolicy,
}

impl SidecarClient {
  fn new(base_url: String, model_id: String, dimensions: usize, request_timeout: Duration) -> Self {
    Self {
      client: reqwest::Client::builder().timeout(request_timeout).build().unwrap_or_default(),
      base_url,
      model_id,
      dimensions,
      // two retries maximum on transport errors
      retry_policy: RetryPolicy::linear(2),
    }
  }

  pub async fn health(&self) -> Result<(), EmbeddingError> {
    let response = self.client.get(format!("{}/health", self.base_url)).send().await?;
    if !response.status().is_success() {
      return Err(EmbeddingError::ProviderError(format!("sidecar /health returned {}", response.status())));
    }
    let _body: HealthResponse = response.json().await?;
    Ok(())
  }

  pub async fn info(&self) -> Result<SidecarInfo, EmbeddingError> {
    let response = self.client.get(format!("{}/info", self.base_url)).send().await?;
    if !response.status().is_success() {
      return Err(EmbeddingError::ProviderError(format!("sidecar /info returned {}", response.status())));
    }
    Ok(response.json().await?)
  }

  async fn embed_request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let request = EmbedRequest {
      texts,
      normalize: true,
      pooling: None,
      batch_size: Some(texts.len()),
    };

    debug!(count = texts.len(), "submitting embed batch to sidecar");
    let response = self.client.post(format!("{}/embed", self.base_url)).json(&request).send().await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!(%status, body, "sidecar /embed failed");
      return Err(EmbeddingError::ProviderError(format!("sidecar returned {status}: {body}")));
    }

    let body: EmbedResponse = response.json().await?;
    for vector in &body.vectors {
      if vector.len() != self.dimensions {
        return Err(EmbeddingError::DimensionMismatch {
          expected: self.dimensions,
          got: vector.len(),
        });
      }
    }
    Ok(body.vectors)
  }
}

#[async_trait]
impl EmbeddingProvider for SidecarClient {
  fn name(&self) -> &str {
    "sidecar"
  }

  fn model_id(&self) -> &str {
    &self.model_id
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let vectors = self.embed_batch(&[text]).await?;
    vectors.into_iter().next().ok_or(EmbeddingError::NotAvailable)
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    with_retry(
      &self.retry_policy,
      |err: &EmbeddingError| if err.is_transient() { Classification::Retry } else { Classification::Fatal },
      || self.embed_request(texts),
    )
    .await
  }

  async fn is_available(&self) -> bool {
    self.health().await.is_ok()
  }
}

/// Process supervision plus the client it hands out. Owns the child
/// process; publishes [`Self::subscribe_restarts`] events so the Embedding
/// Queue can re-queue in-flight batches the moment the sidecar comes back.
pub struct SidecarSupervisor {
  config: SidecarConfig,
  client: SidecarClient,
  child: Mutex<Option<Child>>,
  restart_count: AtomicU32,
  restart_tx: broadcast::Sender<()>,
}

impl SidecarSupervisor {
  /// Spawns the sidecar (if `config.binary_path` is set), waits for it to
  /// report healthy, and queries `/info` to pin down the dimensionality.
  pub async fn spawn(config: SidecarConfig) -> Result<Self, EmbeddingError> {
    let base_url = format!("http://127.0.0.1:{}", config.port);
    let (restart_tx, _) = broadcast::channel(16);

    let child = spawn_child(&config)?;

    // dimension is unknown until /info responds; probe with a throwaway
    // client first, then rebuild once we know it.
    let probe = SidecarClient::new(base_url.clone(), String::new(), 0, config.request_timeout);
    wait_until_healthy(&probe, config.startup_timeout, config.health_poll_interval).await?;
    let info = probe.info().await?;

    let client = SidecarClient::new(base_url, info.model_id, info.dim, config.request_timeout);

    Ok(Self {
      config,
      client,
      child: Mutex::new(child),
      restart_count: AtomicU32::new(0),
      restart_tx,
    })
  }

  pub fn client(&self) -> SidecarClient {
    self.client.clone()
  }

  pub async fn info(&self) -> Result<SidecarInfo, EmbeddingError> {
    self.client.info().await
  }

  /// Subscribers receive a message every time the sidecar process is
  /// detected down and successfully respawned.
  pub fn subscribe_restarts(&self) -> broadcast::Receiver<()> {
    self.restart_tx.subscribe()
  }

  /// Polls child liveness; if it has exited, respawns with back-off up to
  /// `config.max_restarts`, then broadcasts `onRestart`. Intended to be
  /// driven by a periodic task in the orchestrator.
  pub async fn check_and_recover(&self) -> Result<(), EmbeddingError> {
    let exited = {
      let mut guard = self.child.lock().await;
      match guard.as_mut() {
        Some(child) => matches!(child.try_wait(), Ok(Some(_))),
        None => false,
      }
    };

    if !exited {
      return Ok(());
    }

    let attempt = self.restart_count.fetch_add(1, Ordering::SeqCst) + 1;
    if attempt > self.config.max_restarts {
      error!(attempt, max = self.config.max_restarts, "sidecar exceeded max restart attempts");
      return Err(EmbeddingError::ProviderError("sidecar exceeded max restart attempts".into()));
    }

    warn!(attempt, "sidecar process exited unexpectedly, respawning");
    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;

    let new_child = spawn_child(&self.config)?;
    *self.child.lock().await = new_child;
    wait_until_healthy(&self.client, self.config.startup_timeout, self.config.health_poll_interval).await?;

    info!(attempt, "sidecar respawned and healthy");
    let _ = self.restart_tx.send(());
    Ok(())
  }

  /// Graceful shutdown: terminate the child and wait bounded.
  pub async fn shutdown(&self) {
    let mut guard = self.child.lock().await;
    if let Some(mut child) = guard.take() {
      let _ = child.start_kill();
      let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
    }
  }
}

fn spawn_child(config: &SidecarConfig) -> Result<Option<Child>, EmbeddingError> {
  let Some(binary) = &config.binary_path else {
    return Ok(None);
  };

  let mut command = Command::new(binary);
  command.arg("--port").arg(config.port.to_string());
  if let Some(model) = &config.model_id {
    command.arg("--model").arg(model);
  }
  command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

  let child = command
    .spawn()
    .map_err(|err| EmbeddingError::ProviderError(format!("failed to spawn embedder sidecar: {err}")))?;
  Ok(Some(child))
}

async fn wait_until_healthy(client: &SidecarClient, timeout: Duration, poll_interval: Duration) -> Result<(), EmbeddingError> {
  let deadline = tokio::time::Instant::now() + timeout;
  loop {
    if client.health().await.is_ok() {
      return Ok(());
    }
    if tokio::time::Instant::now() >= deadline {
      return Err(EmbeddingError::ProviderError(format!("sidecar did not become healthy within {timeout:?}")));
    }
    tokio::time::sleep(poll_interval).await;
  }
}
