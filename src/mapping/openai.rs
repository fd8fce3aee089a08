//! Minimal OpenAI chat-completions client used by the LLM mapping strategy.

use crate::error::{HealError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A chat model that answers with a JSON object
pub trait ChatBackend {
    /// Send a system and a user message, return the raw JSON text of the reply
    fn complete_json(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: [ApiMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Blocking OpenAI chat client with deterministic decoding
pub struct OpenAiChat {
    client: reqwest::blocking::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChat").field("api_url", &self.api_url).field("model", &self.model).finish()
    }
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_url(api_key, model, DEFAULT_API_URL)
    }

    pub fn with_url(api_key: impl Into<String>, model: impl Into<String>, api_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HealError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, api_key: api_key.into(), api_url: api_url.into(), model: model.into() })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, system: &'a str, user: &'a str) -> ApiRequest<'a> {
        ApiRequest {
            model: &self.model,
            messages: [ApiMessage { role: "system", content: system }, ApiMessage { role: "user", content: user }],
            temperature: 0.0,
            response_format: ResponseFormat { format_type: "json_object" },
        }
    }
}

impl ChatBackend for OpenAiChat {
    fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request(system, user))
            .send()
            .map_err(|e| HealError::Llm(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(HealError::Llm(format!("API error {}: {}", status.as_u16(), text)));
        }

        let body: ApiResponse = response.json().map_err(|e| HealError::Llm(format!("Malformed response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| HealError::Llm("Response contained no message content".to_string()))
    }
}
