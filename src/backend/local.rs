//! Local backend: a small model served on this machine by an Ollama-compatible server.
//!
//! Lifecycle of the model handle:
//!   Uninitialized --(first produce_text / initialize)--> Ready --(dispose)--> Disposed
//! A disposed backend refuses to generate until `initialize()` is called again.
//! A generation already in flight when `dispose` runs is allowed to finish.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::{BackendError, TextBackend};
use crate::config::LocalConfig;
use crate::domain::BackendKind;

/// Loaded-model session. Held only while Ready.
#[derive(Debug)]
struct LocalSession {
  model: String,
  loaded_at: Instant,
}

#[derive(Debug)]
enum Handle {
  Uninitialized,
  Ready(LocalSession),
  Disposed,
}

pub struct LocalModelBackend {
  client: reqwest::Client,
  probe_timeout: Duration,
  host: String,
  model: String,
  system_prompt: String,
  temperature: f32,
  top_k: u32,
  name: String,
  handle: Mutex<Handle>,
}

impl LocalModelBackend {
  pub fn new(cfg: &LocalConfig) -> Self {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()
      .unwrap_or_else(|e| {
        warn!(target: "backend", error = %e, "Falling back to default reqwest client");
        reqwest::Client::new()
      });

    Self {
      client,
      probe_timeout: Duration::from_millis(cfg.probe_timeout_ms),
      host: cfg.host.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
      system_prompt: cfg.system_prompt.clone(),
      temperature: cfg.temperature,
      top_k: cfg.top_k,
      name: format!("Local {}", cfg.model),
      handle: Mutex::new(Handle::Uninitialized),
    }
  }

  /// Ask the server whether it is up and has our model. No generation.
  async fn probe(&self) -> Result<(), BackendError> {
    let url = format!("{}/api/tags", self.host);
    let res = self.client.get(&url)
      .timeout(self.probe_timeout)
      .send().await
      .map_err(|e| BackendError::Unavailable(format!("local model server unreachable: {}", e)))?;
    if !res.status().is_success() {
      return Err(BackendError::Unavailable(format!("local model server HTTP {}", res.status())));
    }
    let tags: TagsResponse = res
      .json()
      .await
      .map_err(|e| BackendError::Unavailable(format!("unexpected tags payload: {}", e)))?;
    if tags.models.iter().any(|m| model_matches(&m.name, &self.model)) {
      Ok(())
    } else {
      Err(BackendError::Unavailable(format!("model '{}' is not installed", self.model)))
    }
  }

  async fn initialize_locked(&self, handle: &mut Handle) -> Result<(), BackendError> {
    if matches!(handle, Handle::Ready(_)) {
      return Ok(());
    }
    self.probe().await?;
    *handle = Handle::Ready(LocalSession { model: self.model.clone(), loaded_at: Instant::now() });
    info!(target: "backend", model = %self.model, "Local model session ready");
    Ok(())
  }

  #[cfg(test)]
  async fn is_initialized(&self) -> bool {
    matches!(*self.handle.lock().await, Handle::Ready(_))
  }
}

#[async_trait]
impl TextBackend for LocalModelBackend {
  fn kind(&self) -> BackendKind { BackendKind::LocalModel }

  fn name(&self) -> &str { &self.name }

  async fn is_available(&self) -> bool {
    match self.probe().await {
      Ok(()) => true,
      Err(e) => {
        debug!(target: "backend", error = %e, "Local model probe failed");
        false
      }
    }
  }

  /// (Re)create the model session. Clears a previous dispose.
  #[instrument(level = "info", skip(self), fields(model = %self.model))]
  async fn initialize(&self) -> Result<(), BackendError> {
    let mut handle = self.handle.lock().await;
    self.initialize_locked(&mut handle).await
  }

  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn produce_text(&self, prompt: &str) -> Result<String, BackendError> {
    // The lock guards the handle state only; generations run concurrently and
    // never block `dispose`.
    {
      let mut handle = self.handle.lock().await;
      if matches!(*handle, Handle::Disposed) {
        return Err(BackendError::Unavailable("local model was released".into()));
      }
      self.initialize_locked(&mut handle).await?;
    }

    let url = format!("{}/api/generate", self.host);
    let req = GenerateRequest {
      model: &self.model,
      prompt,
      system: Some(&self.system_prompt),
      stream: false,
      options: Some(GenerateOptions { temperature: self.temperature, top_k: self.top_k }),
      keep_alive: None,
    };

    let start = Instant::now();
    let res = self.client.post(&url).json(&req).send().await.map_err(|e| {
      error!(target: "backend", error = %e, "Local generation request failed");
      if e.is_connect() {
        BackendError::Unavailable(e.to_string())
      } else {
        BackendError::Transient(e.to_string())
      }
    })?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      error!(target: "backend", %status, body_len = body.len(), "Local model returned an error");
      return Err(if status == reqwest::StatusCode::NOT_FOUND {
        BackendError::Unavailable(format!("local model HTTP {}", status))
      } else {
        BackendError::Transient(format!("local model HTTP {}", status))
      });
    }

    let body: GenerateResponse = res
      .json()
      .await
      .map_err(|e| BackendError::Transient(format!("invalid response body: {}", e)))?;
    let text = body.response.trim().to_string();
    info!(target: "backend", elapsed = ?start.elapsed(), eval_count = ?body.eval_count, response_len = text.len(), "Local model response received");
    Ok(text)
  }

  #[instrument(level = "info", skip(self), fields(model = %self.model))]
  async fn dispose(&self) {
    let mut handle = self.handle.lock().await;
    if let Handle::Ready(session) = &*handle {
      // Ask the server to unload the weights right away.
      let req = GenerateRequest {
        model: &session.model,
        prompt: "",
        system: None,
        stream: false,
        options: None,
        keep_alive: Some(0),
      };
      let url = format!("{}/api/generate", self.host);
      match self.client.post(&url).json(&req).send().await {
        Ok(_) => info!(target: "backend", held_for = ?session.loaded_at.elapsed(), "Local model released"),
        Err(e) => warn!(target: "backend", error = %e, "Local model unload request failed; dropping session anyway"),
      }
    }
    *handle = Handle::Disposed;
  }
}

/// `gemma2` matches `gemma2:latest`; a tagged name must match exactly.
fn model_matches(installed: &str, wanted: &str) -> bool {
  if wanted.contains(':') {
    installed == wanted
  } else {
    installed == wanted || installed.split(':').next() == Some(wanted)
  }
}

// --- Ollama DTOs ---

#[derive(Serialize)]
struct GenerateRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<&'a str>,
  stream: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  options: Option<GenerateOptions>,
  #[serde(skip_serializing_if = "Option::is_none")]
  keep_alive: Option<u32>,
}
#[derive(Serialize)]
struct GenerateOptions { temperature: f32, top_k: u32 }

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)] response: String,
  #[serde(default)] eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct TagsResponse {
  #[serde(default)] models: Vec<TagModel>,
}
#[derive(Deserialize)]
struct TagModel { name: String }
