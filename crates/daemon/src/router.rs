use crate::server::ShutdownHandle;
use pipeline::{EnqueueParams, Orchestrator, SearchFilesParams, SearchParams, SettingsUpdateDto, WatchStartParams};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// JSON-RPC style request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  #[serde(default)]
  pub id: Option<serde_json::Value>,
  pub method: String,
  #[serde(default)]
  pub params: serde_json::Value,
}

/// JSON-RPC style response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
  pub code: i32,
  pub message: String,
}

impl Response {
  pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
    Self { id, result: Some(result), error: None }
  }

  pub fn error(id: Option<serde_json::Value>, code: i32, message: &str) -> Self {
    Self { id, result: None, error: Some(RpcError { code, message: message.to_string() }) }
  }
}

/// Request router for the daemon: parses each `Request`'s params against
/// the command surface described in the orchestrator's wire protocol and
/// dispatches to the matching `Orchestrator` method.
pub struct Router {
  orchestrator: Arc<Orchestrator>,
  shutdown_handle: Mutex<Option<ShutdownHandle>>,
}

impl Router {
  pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
    Self { orchestrator, shutdown_handle: Mutex::new(None) }
  }

  /// Set the shutdown handle (called after the server is created).
  pub async fn set_shutdown_handle(&self, handle: ShutdownHandle) {
    let mut guard = self.shutdown_handle.lock().await;
    *guard = Some(handle);
  }

  pub fn orchestrator(&self) -> &Arc<Orchestrator> {
    &self.orchestrator
  }

  /// Handle an incoming request.
  pub async fn handle(&self, request: Request) -> Response {
    debug!("handling request: {}", request.method);

    match request.method.as_str() {
      "ping" => Response::success(request.id, serde_json::json!("pong")),
      "init" => self.handle_init(request),
      "watchStart" => self.handle_watch_start(request).await,
      "enqueue" => self.handle_enqueue(request),
      "pause" => {
        self.orchestrator.pause();
        Response::success(request.id, serde_json::json!({"status": "paused"}))
      }
      "resume" => {
        self.orchestrator.resume();
        Response::success(request.id, serde_json::json!({"status": "resumed"}))
      }
      "progress" => Response::success(request.id, serde_json::to_value(self.orchestrator.progress()).unwrap()),
      "search" => self.handle_search(request).await,
      "stats" => self.handle_stats(request).await,
      "searchFiles" => self.handle_search_files(request).await,
      "getWatchedFolders" => {
        Response::success(request.id, serde_json::to_value(self.orchestrator.get_watched_folders()).unwrap())
      }
      "getSettings" => Response::success(request.id, serde_json::to_value(self.orchestrator.get_settings()).unwrap()),
      "updateSettings" => self.handle_update_settings(request),
      "reindexAll" => self.handle_reindex_all(request).await,
      "shutdown" => self.handle_shutdown(request).await,

      _ => {
        warn!("unknown method: {}", request.method);
        Response::error(request.id, -32601, &format!("method not found: {}", request.method))
      }
    }
  }

  /// `init` arrives after the orchestrator has already run its startup
  /// state machine (it is driven from `lifecycle::Daemon::run` before the
  /// socket is even bound), so this is an idempotent status ack.
  fn handle_init(&self, request: Request) -> Response {
    Response::success(request.id, serde_json::json!({"state": self.orchestrator.state().as_str()}))
  }

  async fn handle_watch_start(&self, request: Request) -> Response {
    let params: WatchStartParams = match serde_json::from_value(request.params) {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32602, &format!("invalid params: {}", e)),
    };
    match self.orchestrator.watch_start(params).await {
      Ok(result) => Response::success(request.id, serde_json::to_value(result).unwrap()),
      Err(e) => Response::error(request.id, -32000, &e.to_string()),
    }
  }

  fn handle_enqueue(&self, request: Request) -> Response {
    let params: EnqueueParams = match serde_json::from_value(request.params) {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32602, &format!("invalid params: {}", e)),
    };
    let count = self.orchestrator.enqueue(params);
    Response::success(request.id, serde_json::json!({"enqueued": count}))
  }

  async fn handle_search(&self, request: Request) -> Response {
    let params: SearchParams = match serde_json::from_value(request.params) {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32602, &format!("invalid params: {}", e)),
    };
    match self.orchestrator.search(params).await {
      Ok(hits) => Response::success(request.id, serde_json::to_value(hits).unwrap()),
      Err(e) => Response::error(request.id, -32000, &e.to_string()),
    }
  }

  async fn handle_stats(&self, request: Request) -> Response {
    match self.orchestrator.stats().await {
      Ok(stats) => Response::success(request.id, serde_json::to_value(stats).unwrap()),
      Err(e) => Response::error(request.id, -32000, &e.to_string()),
    }
  }

  async fn handle_search_files(&self, request: Request) -> Response {
    let params: SearchFilesParams = match serde_json::from_value(request.params) {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32602, &format!("invalid params: {}", e)),
    };
    match self.orchestrator.search_files(params).await {
      Ok(paths) => {
        let truncated: Vec<String> = paths.into_iter().take(30).collect();
        Response::success(request.id, serde_json::to_value(truncated).unwrap())
      }
      Err(e) => Response::error(request.id, -32000, &e.to_string()),
    }
  }

  fn handle_update_settings(&self, request: Request) -> Response {
    let update: SettingsUpdateDto = match serde_json::from_value(request.params) {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32602, &format!("invalid params: {}", e)),
    };
    match self.orchestrator.update_settings(update) {
      Ok(settings) => Response::success(request.id, serde_json::to_value(settings).unwrap()),
      Err(e) => Response::error(request.id, -32000, &e.to_string()),
    }
  }

  async fn handle_reindex_all(&self, request: Request) -> Response {
    match self.orchestrator.reindex_all().await {
      Ok(count) => Response::success(request.id, serde_json::json!({"enqueued": count})),
      Err(e) => Response::error(request.id, -32000, &e.to_string()),
    }
  }

  async fn handle_shutdown(&self, request: Request) -> Response {
    info!("shutdown requested via RPC");
    self.orchestrator.shutdown().await;
    let guard = self.shutdown_handle.lock().await;
    if let Some(ref handle) = *guard {
      handle.shutdown();
      Response::success(request.id, serde_json::json!({"status": "shutting_down"}))
    } else {
      Response::error(request.id, -32000, "shutdown handle not available")
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_response_success() {
    let response = Response::success(Some(serde_json::json!(1)), serde_json::json!("test"));
    assert!(response.result.is_some());
    assert!(response.error.is_none());
  }

  #[test]
  fn test_response_error() {
    let response = Response::error(Some(serde_json::json!(1)), -1, "test error");
    assert!(response.result.is_none());
    assert!(response.error.is_some());
    assert_eq!(response.error.as_ref().unwrap().code, -1);
  }
}
