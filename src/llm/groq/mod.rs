
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::LlmConfig;
use crate::llm::{ChatMessage, ChatModel};

/// Blocking client for Groq's OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone)]
pub struct GroqClient {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
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

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl GroqClient {
    /// `model` is normally `config.chat_model` or `config.vision_model`.
    /// A missing key is only reported when a request is made.
    #[inline]
    pub fn new(config: &LlmConfig, model: &str, api_key: Option<&str>) -> Result<Self> {
        let endpoint = config
            .base_url()
            .context("Invalid LLM base URL")?
            .join("chat/completions")
            .context("Failed to build chat completion URL")?;

        let timeout =
            (config.timeout_seconds > 0).then(|| Duration::from_secs(config.timeout_seconds));

        Ok(Self {
            endpoint,
            model: model.to_string(),
            api_key: api_key.map(str::to_string),
            agent: ureq::Agent::config_builder()
                .timeout_global(timeout)
                .http_status_as_error(false)
                .build()
                .into(),
        })
    }

    #[inline]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl ChatModel for GroqClient {
    #[inline]
    fn complete(&self, messages: &[ChatMessage], temperature: Option<f32>) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("No API key configured for the chat completion service")?;

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize completion request")?;

        debug!(
            "Requesting completion from {} ({} messages)",
            self.model,
            messages.len()
        );

        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", &format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .with_context(|| format!("Request to {} failed", self.endpoint))?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .context("Failed to read completion response")?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(anyhow::anyhow!(
                "Model '{}' returned HTTP {}: {}",
                self.model,
                status.as_u16(),
                detail
            ));
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&body).context("Failed to parse completion response")?;

        // The text is returned as sent, blank included
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .with_context(|| format!("Model '{}' returned no choices", self.model))
    }

    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }
}
