//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the connection
//! registry and the orchestrator shared by every WebSocket connection.

use crate::config::{ChatBackendConfig, Config};
use anyhow::Context;
use panda_core::{
    llm_client::{AnthropicClient, ChatBackend, GatewayClient, LocalClient},
    orchestrator::SessionOrchestrator,
    registry::ConnectionRegistry,
    stt::WhisperClient,
    tts::KokoroClient,
    voice_effect::FfmpegVoiceEffect,
};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub orchestrator: SessionOrchestrator,
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(orchestrator: SessionOrchestrator, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            orchestrator,
            static_dir: static_dir.into(),
        }
    }

    /// Builds the remote clients described by `config` and wires them into an orchestrator.
    pub fn from_config(config: &Config, system_prompt: String) -> anyhow::Result<Self> {
        let transcriber = WhisperClient::new(config.whisper.clone())
            .context("Failed to build the transcription client")?;
        let synthesizer = KokoroClient::new(config.kokoro.clone())
            .context("Failed to build the synthesis client")?;
        let chat = chat_backend(&config.chat)?;
        info!(backend = chat.name(), "Chat backend selected.");

        let mut orchestrator = SessionOrchestrator::new(
            Arc::new(transcriber),
            chat,
            Arc::new(synthesizer),
            system_prompt,
        );

        if config.voice_effect {
            info!(tool = %config.ffmpeg_path.display(), "Voice effect enabled.");
            let effect = FfmpegVoiceEffect::new(
                config.ffmpeg_path.clone(),
                config.kokoro.response_format.clone(),
            );
            orchestrator = orchestrator.with_voice_effect(Arc::new(effect));
        }

        Ok(Self::new(orchestrator, config.static_dir.clone()))
    }
}

fn chat_backend(config: &ChatBackendConfig) -> anyhow::Result<Arc<dyn ChatBackend>> {
    let backend: Arc<dyn ChatBackend> = match config {
        ChatBackendConfig::Anthropic(c) => Arc::new(
            AnthropicClient::new(c.clone()).context("Failed to build the Anthropic client")?,
        ),
        ChatBackendConfig::Gateway(c) => Arc::new(
            GatewayClient::new(c.clone()).context("Failed to build the gateway client")?,
        ),
        ChatBackendConfig::Local(c) => Arc::new(
            LocalClient::new(c.clone()).context("Failed to build the local inference client")?,
        ),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use panda_core::{
        llm_client::{GatewayConfig, LocalConfig},
        stt::WhisperConfig,
        tts::KokoroConfig,
    };
    use std::net::SocketAddr;
    use tracing::Level;

    fn config(chat: ChatBackendConfig) -> Config {
        Config {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: Level::INFO,
            static_dir: PathBuf::from("./static"),
            system_prompt_path: None,
            whisper: WhisperConfig::new("http://127.0.0.1:9"),
            kokoro: KokoroConfig::new("http://127.0.0.1:9"),
            chat,
            voice_effect: false,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }

    #[test]
    fn test_chat_backend_follows_configured_provider() {
        let gateway = chat_backend(&ChatBackendConfig::Gateway(GatewayConfig::new(
            "http://gateway.test",
            "key",
        )))
        .unwrap();
        assert_eq!(gateway.name(), "gateway");

        let local = chat_backend(&ChatBackendConfig::Local(LocalConfig::default())).unwrap();
        assert_eq!(local.name(), "local");
    }

    #[test]
    fn test_from_config_starts_with_empty_registry() {
        let state = AppState::from_config(
            &config(ChatBackendConfig::Local(LocalConfig::default())),
            "You are a test persona.".to_string(),
        )
        .unwrap();

        assert!(state.registry.is_empty());
        assert_eq!(state.orchestrator.system_prompt(), "You are a test persona.");
        assert_eq!(state.static_dir, PathBuf::from("./static"));
    }

    #[test]
    fn test_from_config_accepts_voice_effect() {
        let mut config = config(ChatBackendConfig::Local(LocalConfig::default()));
        config.voice_effect = true;

        assert!(AppState::from_config(&config, String::new()).is_ok());
    }
}
