//! Hosted backend: minimal OpenAI chat.completions client.
//!
//! We send one user message and return the plain text of the first choice.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
  header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
  StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::{BackendError, TextBackend};
use crate::config::HostedConfig;
use crate::domain::BackendKind;

pub struct HostedBackend {
  client: reqwest::Client,
  api_key: Option<String>,
  base_url: String,
  model: String,
  temperature: f32,
  max_tokens: u32,
  name: String,
}

impl HostedBackend {
  pub fn new(cfg: &HostedConfig) -> Self {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()
      .unwrap_or_else(|e| {
        warn!(target: "backend", error = %e, "Falling back to default reqwest client");
        reqwest::Client::new()
      });

    Self {
      client,
      api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
      temperature: cfg.temperature,
      max_tokens: cfg.max_tokens,
      name: format!("OpenAI {}", cfg.model),
    }
  }

  pub fn has_api_key(&self) -> bool {
    self.api_key.is_some()
  }
}

#[async_trait]
impl TextBackend for HostedBackend {
  fn kind(&self) -> BackendKind { BackendKind::HostedModel }

  fn name(&self) -> &str { &self.name }

  // Credential presence only; a real request would cost tokens.
  async fn is_available(&self) -> bool {
    self.has_api_key()
  }

  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn produce_text(&self, prompt: &str) -> Result<String, BackendError> {
    let api_key = self
      .api_key
      .as_deref()
      .ok_or_else(|| BackendError::Unavailable("OpenAI APIキーが設定されていません。".into()))?;

    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
      temperature: self.temperature,
      max_tokens: Some(self.max_tokens),
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "kotoba-quiz-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", api_key))
      .json(&req).send().await
      .map_err(|e| {
        error!(target: "backend", error = %e, "OpenAI request failed");
        BackendError::Transient(e.to_string())
      })?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let err = classify_openai_error(status, &body);
      error!(target: "backend", %status, error = ?err, "OpenAI returned an error");
      return Err(err);
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| BackendError::Transient(format!("invalid response body: {}", e)))?;
    if let Some(usage) = &body.usage {
      info!(target: "backend", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    info!(target: "backend", elapsed = ?start.elapsed(), response_len = text.len(), "OpenAI response received");
    Ok(text)
  }
}

/// Map an unsuccessful HTTP answer to the adapter error taxonomy.
pub(crate) fn classify_openai_error(status: StatusCode, body: &str) -> BackendError {
  let (code, message) = extract_openai_error(body)
    .unwrap_or_else(|| (None, format!("OpenAI HTTP {}", status)));

  match code.as_deref() {
    Some("invalid_api_key") => return BackendError::Auth(message),
    Some("insufficient_quota") => return BackendError::Quota(message),
    _ => {}
  }
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Auth(message),
    StatusCode::TOO_MANY_REQUESTS => BackendError::Quota(message),
    _ => BackendError::Transient(format!("OpenAI HTTP {}: {}", status, message)),
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract `(code, message)` from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<(Option<String>, String)> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String, #[serde(default)] code: Option<String> }
  serde_json::from_str::<EWrap>(body).ok().map(|w| (w.error.code, w.error.message))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cfg(key: Option<&str>) -> HostedConfig {
    HostedConfig { api_key: key.map(str::to_string), ..HostedConfig::default() }
  }

  #[tokio::test]
  async fn availability_tracks_credentials() {
    assert!(!HostedBackend::new(&cfg(None)).is_available().await);
    assert!(HostedBackend::new(&cfg(Some("sk-live"))).is_available().await);
    assert!(!HostedBackend::new(&cfg(Some("   "))).is_available().await);
  }

  #[tokio::test]
  async fn missing_key_fails_without_network() {
    let b = HostedBackend::new(&cfg(None));
    let err = b.produce_text("hi").await.unwrap_err();
    assert!(matches!(err, BackendError::Unavailable(_)));
  }

  #[test]
  fn error_codes_map_to_taxonomy() {
    let bad_key = r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"}}"#;
    let quota = r#"{"error":{"message":"You exceeded your current quota","code":"insufficient_quota"}}"#;
    assert_eq!(
      classify_openai_error(StatusCode::UNAUTHORIZED, bad_key),
      BackendError::Auth("Incorrect API key provided".into())
    );
    assert_eq!(
      classify_openai_error(StatusCode::TOO_MANY_REQUESTS, quota),
      BackendError::Quota("You exceeded your current quota".into())
    );
    assert!(matches!(classify_openai_error(StatusCode::TOO_MANY_REQUESTS, "rate limited"), BackendError::Quota(_)));
    assert!(matches!(classify_openai_error(StatusCode::FORBIDDEN, ""), BackendError::Auth(_)));
    assert!(matches!(classify_openai_error(StatusCode::BAD_GATEWAY, "<html>"), BackendError::Transient(_)));
  }

  #[test]
  fn name_reports_model() {
    let b = HostedBackend::new(&cfg(Some("k")));
    assert_eq!(b.name(), "OpenAI gpt-4o-mini");
    assert_eq!(b.kind(), BackendKind::HostedModel);
  }
}
