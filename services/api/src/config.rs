use panda_core::{
    llm_client::{
        AnthropicConfig, DEFAULT_MAX_TOKENS, GatewayConfig, LocalConfig, anthropic, local,
    },
    stt::{DEFAULT_STT_TIMEOUT, DEFAULT_WHISPER_MODEL, WhisperConfig},
    tts::{
        DEFAULT_KOKORO_MODEL, DEFAULT_KOKORO_VOICE, DEFAULT_TTS_FORMAT, DEFAULT_TTS_TIMEOUT,
        KokoroConfig,
    },
    voice_effect::DEFAULT_FFMPEG,
};
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported completion backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatProvider {
    Anthropic,
    Gateway,
    Local,
}

/// Connection settings of the configured completion backend.
#[derive(Clone, Debug)]
pub enum ChatBackendConfig {
    Anthropic(AnthropicConfig),
    Gateway(GatewayConfig),
    Local(LocalConfig),
}

impl ChatBackendConfig {
    pub fn provider(&self) -> ChatProvider {
        match self {
            ChatBackendConfig::Anthropic(_) => ChatProvider::Anthropic,
            ChatBackendConfig::Gateway(_) => ChatProvider::Gateway,
            ChatBackendConfig::Local(_) => ChatProvider::Local,
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub static_dir: PathBuf,
    pub system_prompt_path: Option<PathBuf>,
    pub whisper: WhisperConfig,
    pub kokoro: KokoroConfig,
    pub chat: ChatBackendConfig,
    pub voice_effect: bool,
    pub ffmpeg_path: PathBuf,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn required(name: &str, context: &str) -> Result<String, ConfigError> {
    var(name).ok_or_else(|| ConfigError::MissingVar(format!("{name} must be set for {context}")))
}

fn parsed<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn seconds(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = parsed::<u64>(name, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "timeout must be at least one second".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn flag(name: &str) -> Result<bool, ConfigError> {
    match var(name).map(|v| v.to_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{v}' is not a boolean"),
            )),
        },
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:8080");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let static_dir = PathBuf::from(var_or("STATIC_DIR", "./static"));
        let system_prompt_path = var("SYSTEM_PROMPT_PATH").map(PathBuf::from);

        let whisper = WhisperConfig {
            base_url: var_or("WHISPER_URL", "http://whisper:8000"),
            model: var_or("WHISPER_MODEL", DEFAULT_WHISPER_MODEL),
            timeout: seconds("STT_TIMEOUT_SECS", DEFAULT_STT_TIMEOUT)?,
        };

        let kokoro = KokoroConfig {
            base_url: var_or("KOKORO_URL", "http://kokoro:8000"),
            model: var_or("KOKORO_MODEL", DEFAULT_KOKORO_MODEL),
            voice: var_or("KOKORO_VOICE", DEFAULT_KOKORO_VOICE),
            response_format: var_or("TTS_FORMAT", DEFAULT_TTS_FORMAT),
            speed: parsed("TTS_SPEED", 1.0f32)?,
            timeout: seconds("TTS_TIMEOUT_SECS", DEFAULT_TTS_TIMEOUT)?,
        };

        let chat = Self::chat_backend_from_env()?;

        Ok(Self {
            bind_address,
            log_level,
            static_dir,
            system_prompt_path,
            whisper,
            kokoro,
            chat,
            voice_effect: flag("VOICE_EFFECT")?,
            ffmpeg_path: PathBuf::from(var_or("FFMPEG_PATH", DEFAULT_FFMPEG)),
        })
    }

    fn chat_backend_from_env() -> Result<ChatBackendConfig, ConfigError> {
        let provider_str = var_or("CHAT_PROVIDER", "anthropic");
        let provider = match provider_str.to_lowercase().as_str() {
            "anthropic" => ChatProvider::Anthropic,
            "gateway" => ChatProvider::Gateway,
            "local" => ChatProvider::Local,
            other => {
                return Err(ConfigError::InvalidValue(
                    "CHAT_PROVIDER".to_string(),
                    format!("'{other}' is not one of anthropic, gateway, local"),
                ));
            }
        };
        let max_tokens = parsed("CHAT_MAX_TOKENS", DEFAULT_MAX_TOKENS)?;

        let backend = match provider {
            ChatProvider::Anthropic => {
                let api_key = required("ANTHROPIC_API_KEY", "the 'anthropic' provider")?;
                ChatBackendConfig::Anthropic(AnthropicConfig {
                    base_url: var_or("ANTHROPIC_URL", anthropic::DEFAULT_ANTHROPIC_URL),
                    model: var_or("CHAT_MODEL", anthropic::DEFAULT_ANTHROPIC_MODEL),
                    max_tokens,
                    timeout: seconds("CHAT_TIMEOUT_SECS", Duration::from_secs(60))?,
                    api_key,
                })
            }
            ChatProvider::Gateway => {
                let base_url = required("GATEWAY_URL", "the 'gateway' provider")?;
                let api_key = required("GATEWAY_API_KEY", "the 'gateway' provider")?;
                let mut config = GatewayConfig::new(base_url, api_key);
                config.model = var_or("CHAT_MODEL", &config.model);
                config.max_tokens = max_tokens;
                config.timeout = seconds("CHAT_TIMEOUT_SECS", config.timeout)?;
                ChatBackendConfig::Gateway(config)
            }
            ChatProvider::Local => ChatBackendConfig::Local(LocalConfig {
                base_url: var_or("LOCAL_LLM_URL", local::DEFAULT_LOCAL_URL),
                model: var_or("CHAT_MODEL", local::DEFAULT_LOCAL_MODEL),
                max_tokens,
                timeout: seconds("CHAT_TIMEOUT_SECS", Duration::from_secs(120))?,
            }),
        };
        Ok(backend)
    }
}
