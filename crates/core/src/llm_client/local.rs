//! Local inference backend: an Ollama-style `/api/chat` server.

use super::{APOLOGY, ChatBackend, DEFAULT_MAX_TOKENS, WireMessage, with_system_prompt};
use crate::{
    conversation::ChatMessage,
    error::ClientError,
    http::{self, endpoint},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_LOCAL_URL: &str = "http://localhost:11434";
pub const DEFAULT_LOCAL_MODEL: &str = "llama3.1";

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LOCAL_URL.to_string(),
            model: DEFAULT_LOCAL_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

pub struct LocalClient {
    http: reqwest::Client,
    url: String,
    config: LocalConfig,
}

impl LocalClient {
    pub fn new(config: LocalConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: http::client(config.timeout)?,
            url: endpoint(&config.base_url, "/api/chat"),
            config,
        })
    }

    /// Sends the history without streaming and reads `message.content`.
    pub async fn try_complete(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<String, ClientError> {
        debug!(model = %self.config.model, messages = history.len(), "Requesting completion from local server");

        let request = ChatRequest {
            model: &self.config.model,
            messages: with_system_prompt(system_prompt, history),
            stream: false,
            options: ChatOptions {
                num_predict: self.config.max_tokens,
            },
        };
        let response = self.http.post(&self.url).json(&request).send().await?;
        let body: ChatResponse = http::json_body(response).await?;

        body.message
            .map(|message| message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ClientError::Malformed("response carried no message".into()))
    }
}

#[async_trait]
impl ChatBackend for LocalClient {
    fn name(&self) -> &'static str {
        "local"
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> LocalClient {
        LocalClient::new(LocalConfig {
            base_url: server.uri(),
            ..LocalConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_message_object_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3.1",
                "stream": false,
                "options": {"num_predict": 500},
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "how many nodes?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3.1",
                "message": {"role": "assistant", "content": " Three nodes are online. "},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .complete(&[ChatMessage::user("how many nodes?")], "sys")
            .await;
        assert_eq!(reply, "Three nodes are online.");
    }

    #[tokio::test]
    async fn test_missing_message_yields_apology() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .complete(&[ChatMessage::user("hi")], "sys")
            .await;
        assert_eq!(reply, APOLOGY);
    }

    #[tokio::test]
    async fn test_unreachable_server_yields_apology() {
        let client = LocalClient::new(LocalConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(200),
            ..LocalConfig::default()
        })
        .unwrap();

        assert_eq!(client.complete(&[ChatMessage::user("hi")], "sys").await, APOLOGY);
    }
}
