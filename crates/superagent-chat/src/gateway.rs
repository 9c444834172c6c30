//! Model gateway: one blocking call to an OpenAI-compatible
//! chat-completion endpoint (Fireworks, Groq, OpenRouter, OpenAI).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use superagent_core::config::ProviderConfig;
use tracing::{debug, warn};

use crate::types::{Message, ModelRequest, ResponseFormat};

/// Failure of a single gateway call. Never retried here.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no API credential configured for model {model}")]
    MissingCredential { model: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response body: {0}")]
    MalformedBody(String),
    #[error("upstream returned no choices")]
    EmptyCompletion,
}

impl GatewayError {
    /// HTTP status of the upstream response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A chat-completion provider.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the request and return the first choice's text.
    async fn complete(&self, request: &ModelRequest) -> Result<String, GatewayError>;

    /// Model identifier sent upstream.
    fn model_name(&self) -> &str;
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
}

#[derive(Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl From<ResponseFormat> for WireResponseFormat {
    fn from(format: ResponseFormat) -> Self {
        match format {
            ResponseFormat::JsonObject => WireResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

// =============================================================================
// OpenAiCompatGateway
// =============================================================================

/// reqwest-backed [`ChatModel`] for any `/chat/completions` endpoint.
pub struct OpenAiCompatGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            model: model.into(),
        }
    }

    pub fn from_config(cfg: &ProviderConfig) -> Self {
        Self::new(
            cfg.base_url.clone(),
            cfg.api_key.clone(),
            cfg.model.clone(),
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatGateway {
    async fn complete(&self, request: &ModelRequest) -> Result<String, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::MissingCredential {
                model: self.model.clone(),
            })?;

        let s = &request.sampling;
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: s.temperature,
            top_p: s.top_p,
            top_k: s.top_k,
            presence_penalty: s.presence_penalty,
            frequency_penalty: s.frequency_penalty,
            max_tokens: s.max_tokens,
            stream: false,
            response_format: request.response_format.map(WireResponseFormat::from),
        };

        debug!(model = %self.model, messages = request.messages.len(), "Sending completion request");

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!(model = %self.model, status = status.as_u16(), "Completion request rejected");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::MalformedBody(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(GatewayError::EmptyCompletion)?;

        Ok(choice.message.content.unwrap_or_default())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
