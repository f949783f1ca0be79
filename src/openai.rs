//! Minimal OpenAI client for our use-cases.
//!
//! We call chat.completions for concept/question text and images/generations
//! for diagrams. Calls are instrumented and log model names, latencies, and
//! response sizes (not contents).
//!
//! Every call runs under a hard deadline (`CALL_TIMEOUT_SECS`); a hang in
//! the network layer surfaces as `PipelineError::Timeout` instead of
//! blocking batch progress indefinitely.
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use std::time::Duration;

use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{PipelineError, Result};

/// Deadline for a single external call. The reqwest client carries a looser
/// timeout as a backstop for the body read.
pub const CALL_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub text_model: String,
  pub image_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let text_model =
      std::env::var("OPENAI_TEXT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let image_model =
      std::env::var("OPENAI_IMAGE_MODEL").unwrap_or_else(|_| "dall-e-3".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(CALL_TIMEOUT_SECS + 30))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, text_model, image_model })
  }

  /// Plain-text chat completion. Callers strip fences and parse themselves
  /// because failure policy differs per component (see concepts/questions).
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.text_model, user_len = user.len()))]
  pub async fn chat_text(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.text_model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
    };

    let started = std::time::Instant::now();
    let res = self
      .with_deadline(self.client.post(&url)
        .header(USER_AGENT, "testforge-backend/0.1")
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
        .json(&req)
        .send())
      .await?
      .map_err(|e| PipelineError::ModelCall(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(PipelineError::ModelCall(format!("OpenAI HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse = self
      .with_deadline(res.json())
      .await?
      .map_err(|e| PipelineError::ModelCall(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default()
      .trim()
      .to_string();
    if text.is_empty() {
      return Err(PipelineError::ModelCall("OpenAI returned empty content".into()));
    }

    info!(elapsed_ms = started.elapsed().as_millis() as u64, response_len = text.len(), "Chat completion received");
    Ok(text)
  }

  /// Generate one image and return the decoded PNG bytes.
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.image_model, prompt_len = prompt.len()))]
  pub async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>> {
    let url = format!("{}/images/generations", self.base_url);
    let req = ImageGenerationRequest {
      model: self.image_model.clone(),
      prompt: prompt.to_string(),
      n: 1,
      size: "1024x1024".into(),
      response_format: "b64_json".into(),
    };

    let res = self
      .with_deadline(self.client.post(&url)
        .header(USER_AGENT, "testforge-backend/0.1")
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
        .json(&req)
        .send())
      .await?
      .map_err(|e| PipelineError::ImageRequest(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(PipelineError::ImageRequest(format!("OpenAI HTTP {}: {}", status, msg)));
    }

    let body: ImageGenerationResponse = self
      .with_deadline(res.json())
      .await?
      .map_err(|e| PipelineError::ImageRequest(e.to_string()))?;
    let b64 = body
      .data
      .first()
      .and_then(|d| d.b64_json.clone())
      .ok_or_else(|| PipelineError::ImageRequest("no image payload in response".into()))?;

    let bytes = base64::engine::general_purpose::STANDARD
      .decode(b64.as_bytes())
      .map_err(|e| PipelineError::ImageRequest(format!("bad base64 payload: {e}")))?;
    info!(size = bytes.len(), "Image generated");
    Ok(bytes)
  }

  /// Wrap a future in the per-call deadline.
  async fn with_deadline<F, T, E>(&self, fut: F) -> Result<std::result::Result<T, E>>
  where
    F: std::future::Future<Output = std::result::Result<T, E>>,
  {
    tokio::time::timeout(Duration::from_secs(CALL_TIMEOUT_SECS), fut)
      .await
      .map_err(|_| PipelineError::Timeout(CALL_TIMEOUT_SECS))
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
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

// --- Image DTOs ---

#[derive(Serialize)]
struct ImageGenerationRequest {
  model: String,
  prompt: String,
  n: u8,
  size: String,
  response_format: String,
}
#[derive(Deserialize)]
struct ImageGenerationResponse { data: Vec<ImageDatum> }
#[derive(Deserialize)]
struct ImageDatum { #[serde(default)] b64_json: Option<String> }

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

  /// Client pointed at a port nothing listens on; calls fail fast.
  pub(crate) fn unreachable_client() -> OpenAI {
    OpenAI {
      client: reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("client"),
      api_key: "test-key".into(),
      base_url: "http://127.0.0.1:9".into(),
      text_model: "test-model".into(),
      image_model: "test-image-model".into(),
    }
  }

  #[tokio::test]
  async fn chat_failure_is_a_model_call_error() {
    let oa = unreachable_client();
    let err = oa.chat_text("sys", "user", 0.2).await.unwrap_err();
    assert!(matches!(err, PipelineError::ModelCall(_)), "got: {err:?}");
  }

  #[tokio::test]
  async fn image_failure_is_an_image_request_error() {
    let oa = unreachable_client();
    let err = oa.generate_image("a diagram").await.unwrap_err();
    assert!(matches!(err, PipelineError::ImageRequest(_)), "got: {err:?}");
  }

  #[test]
  fn openai_error_body_is_unwrapped() {
    let body = r#"{"error": {"message": "rate limited", "type": "requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("rate limited"));
    assert_eq!(extract_openai_error("not json"), None);
  }
}
