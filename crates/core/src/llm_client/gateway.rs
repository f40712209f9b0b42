//! Enterprise gateway backend: any OpenAI-compatible `chat/completions` endpoint.

use super::{APOLOGY, ChatBackend, DEFAULT_MAX_TOKENS, WireMessage, with_system_prompt};
use crate::{
    conversation::ChatMessage,
    error::ClientError,
    http::{self, endpoint},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tracing::{debug, warn};

pub const DEFAULT_GATEWAY_MODEL: &str = "gpt-4o";

#[derive(Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_GATEWAY_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct GatewayClient {
    http: reqwest::Client,
    url: String,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: http::client(config.timeout)?,
            url: endpoint(&config.base_url, "/v1/chat/completions"),
            config,
        })
    }

    /// Sends the history and reads `choices[0].message.content`.
    pub async fn try_complete(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<String, ClientError> {
        debug!(model = %self.config.model, messages = history.len(), "Requesting completion from gateway");

        let request = CompletionRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: with_system_prompt(system_prompt, history),
        };
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;
        let body: CompletionResponse = http::json_body(response).await?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ClientError::Malformed("response carried no message content".into()))
    }
}

#[async_trait]
impl ChatBackend for GatewayClient {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn complete(&self, history: &[ChatMessage], system_prompt: &str) -> String {
        match self.try_complete(history, system_prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(backend = self.name(), error = %e, "Completion failed; replying with an apology");
                APOLOGY.to_string()
            }
        }
    }
}
