//! Minimal OpenAI client for test generation.
//!
//! We only call chat.completions with a single user message and read back plain
//! text. Calls are instrumented and log model names, latencies, and response
//! sizes (not contents). The API key is never logged.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

#[derive(Debug, Error)]
pub enum ModelError {
  #[error(transparent)]
  Http(#[from] reqwest::Error),

  #[error("OpenAI HTTP {status}: {message}")]
  Status { status: u16, message: String },

  #[error("Model returned an empty completion")]
  EmptyCompletion,

  #[error("No language model configured (OPENAI_API_KEY not set)")]
  NotConfigured,
}

/// Sampling parameters of one completion request.
#[derive(Clone, Debug)]
pub struct CompletionParams {
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
}

/// Prompt in, free text out.
#[async_trait]
pub trait CompletionModel: Send + Sync {
  async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, ModelError>;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(timeout: Duration) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url })
  }
}

#[async_trait]
impl CompletionModel for OpenAI {
  #[instrument(level = "info", skip(self, prompt, params), fields(model = %params.model, prompt_len = prompt.len(), max_tokens = params.max_tokens))]
  async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, ModelError> {
    let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
    let req = ChatCompletionRequest {
      model: params.model.clone(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
      temperature: params.temperature,
      max_tokens: Some(params.max_tokens),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "nurse-mentor-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), status = status.as_u16(), "Model call failed");
      return Err(ModelError::Status { status: status.as_u16(), message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default().trim().to_string();

    info!(elapsed = ?start.elapsed(), completion_len = text.len(), "Model response received");
    if text.is_empty() {
      return Err(ModelError::EmptyCompletion);
    }
    Ok(text)
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

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_carries_token_budget_and_temperature() {
    let req = ChatCompletionRequest {
      model: "gpt-4o-mini".into(),
      messages: vec![ChatMessageReq { role: "user".into(), content: "hi".into() }],
      temperature: 0.7,
      max_tokens: Some(3000),
    };
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v["model"], "gpt-4o-mini");
    assert_eq!(v["max_tokens"], 3000);
    assert_eq!(v["messages"][0]["role"], "user");
    assert!((v["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
  }

  #[test]
  fn openai_error_message_is_extracted() {
    let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert_eq!(extract_openai_error("oops"), None);
  }
}
