//! Cloud backend: the Anthropic Messages API.

use super::{APOLOGY, ChatBackend, DEFAULT_MAX_TOKENS, NO_TEXT_REPLY};
use crate::{
    conversation::ChatMessage,
    error::ClientError,
    http::{self, endpoint},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tracing::{debug, warn};

pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_ANTHROPIC_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicClient {
    http: reqwest::Client,
    url: String,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: http::client(config.timeout)?,
            url: endpoint(&config.base_url, "/v1/messages"),
            config,
        })
    }

    /// Sends the history and reads the text of the first content block.
    pub async fn try_complete(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<String, ClientError> {
        debug!(model = %self.config.model, messages = history.len(), "Requesting completion from Anthropic");

        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: system_prompt,
            messages: history,
        };
        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;
        let body: MessagesResponse = http::json_body(response).await?;

        let first = body
            .content
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Malformed("response carried no content blocks".into()))?;
        Ok(first.text.unwrap_or_else(|| NO_TEXT_REPLY.to_string()))
    }
}

#[async_trait]
impl ChatBackend for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
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
