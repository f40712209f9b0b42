//! Text-to-speech through a Kokoro (OpenAI-compatible) speech endpoint.

use crate::{
    error::ClientError,
    http::{self, endpoint},
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_KOKORO_MODEL: &str = "kokoro";
pub const DEFAULT_KOKORO_VOICE: &str = "af_sarah";
pub const DEFAULT_TTS_FORMAT: &str = "mp3";
pub const DEFAULT_TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Converts reply text to encoded audio.
///
/// Implementations never fail: audio that cannot be synthesized is reported
/// as an empty buffer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Bytes;
}

#[derive(Debug, Clone)]
pub struct KokoroConfig {
    pub base_url: String,
    pub model: String,
    pub voice: String,
    pub response_format: String,
    pub speed: f32,
    pub timeout: Duration,
}

impl KokoroConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: DEFAULT_KOKORO_MODEL.to_string(),
            voice: DEFAULT_KOKORO_VOICE.to_string(),
            response_format: DEFAULT_TTS_FORMAT.to_string(),
            speed: 1.0,
            timeout: DEFAULT_TTS_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    speed: f32,
}

/// Client for `POST /v1/audio/speech`.
pub struct KokoroClient {
    http: reqwest::Client,
    url: String,
    config: KokoroConfig,
}

impl KokoroClient {
    pub fn new(config: KokoroConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: http::client(config.timeout)?,
            url: endpoint(&config.base_url, "/v1/audio/speech"),
            config,
        })
    }

    pub async fn try_synthesize(&self, text: &str) -> Result<Bytes, ClientError> {
        debug!(url = %self.url, voice = %self.config.voice, chars = text.len(), "Requesting speech synthesis");

        let request = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &self.config.voice,
            response_format: &self.config.response_format,
            speed: self.config.speed,
        };
        let response = self.http.post(&self.url).json(&request).send().await?;
        let audio = http::ensure_success(response).await?.bytes().await?;
        if audio.is_empty() {
            return Err(ClientError::Malformed("speech endpoint returned no audio".into()));
        }
        Ok(audio)
    }
}

#[async_trait]
impl Synthesizer for KokoroClient {
    async fn synthesize(&self, text: &str) -> Bytes {
        match self.try_synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "Speech synthesis failed; sending no audio for this reply");
                Bytes::new()
            }
        }
    }
}
