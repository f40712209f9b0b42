//! Speech-to-text through a Whisper-compatible transcription endpoint.

use crate::{
    error::ClientError,
    http::{self, endpoint},
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_WHISPER_MODEL: &str = "whisper-small";
pub const DEFAULT_STT_TIMEOUT: Duration = Duration::from_secs(30);

/// Converts one recorded utterance to text.
///
/// Implementations never fail: a transcription that cannot be obtained is
/// reported as an empty string.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Bytes) -> String;
}

#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl WhisperConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: DEFAULT_WHISPER_MODEL.to_string(),
            timeout: DEFAULT_STT_TIMEOUT,
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Client for `POST /v1/audio/transcriptions`.
pub struct WhisperClient {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl WhisperClient {
    pub fn new(config: WhisperConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: http::client(config.timeout)?,
            url: endpoint(&config.base_url, "/v1/audio/transcriptions"),
            model: config.model,
        })
    }

    /// Uploads the audio as a multipart form and returns the transcript.
    pub async fn try_transcribe(&self, audio: Bytes) -> Result<String, ClientError> {
        debug!(url = %self.url, model = %self.model, audio_bytes = audio.len(), "Sending audio for transcription");

        let file = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.webm")
            .mime_str("audio/webm")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone());

        let response = self.http.post(&self.url).multipart(form).send().await?;
        let body: TranscriptionResponse = http::json_body(response).await?;
        Ok(body.text)
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: Bytes) -> String {
        match self.try_transcribe(audio).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Transcription failed; continuing with an empty transcript");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> WhisperClient {
        WhisperClient::new(WhisperConfig::new(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_transcribe_uploads_multipart_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header_regex("content-type", "^multipart/form-data"))
            .and(body_string_contains("whisper-small"))
            .and(body_string_contains("audio.webm"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"text": "what is the weather"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server)
            .transcribe(Bytes::from_static(b"webm-bytes"))
            .await;
        assert_eq!(text, "what is the weather");
    }

    #[tokio::test]
    async fn test_missing_text_field_is_empty_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let text = client_for(&server).transcribe(Bytes::from_static(b"x")).await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_server_error_falls_back_to_empty_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .try_transcribe(Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Status { status, .. } if status.as_u16() == 500));
        assert_eq!(client.transcribe(Bytes::from_static(b"x")).await, "");
    }

    #[tokio::test]
    async fn test_malformed_body_falls_back_to_empty_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.try_transcribe(Bytes::from_static(b"x")).await,
            Err(ClientError::Malformed(_))
        ));
        assert_eq!(client.transcribe(Bytes::from_static(b"x")).await, "");
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_empty_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"text": "too late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut config = WhisperConfig::new(server.uri());
        config.timeout = Duration::from_millis(50);
        let client = WhisperClient::new(config).unwrap();
        assert_eq!(client.transcribe(Bytes::from_static(b"x")).await, "");
    }
}
