//! Main Entrypoint for the PANDA9000 API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the assistant persona.
//! 3. Initializing the transcription, completion and synthesis clients.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use panda_api::{
    config::{ChatBackendConfig, Config},
    router::create_router,
    state::AppState,
};
use panda_core::prompt::DEFAULT_SYSTEM_PROMPT;
use std::{fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Reads the persona from `path`, or falls back to the built-in one.
fn load_system_prompt(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => {
            let prompt = fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt {}", path.display()))?;
            info!(path = %path.display(), "Loaded system prompt from file.");
            Ok(prompt)
        }
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let system_prompt = load_system_prompt(config.system_prompt_path.as_deref())?;
    let app_state = Arc::new(AppState::from_config(&config, system_prompt)?);

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    let model = match &config.chat {
        ChatBackendConfig::Anthropic(c) => c.model.as_str(),
        ChatBackendConfig::Gateway(c) => c.model.as_str(),
        ChatBackendConfig::Local(c) => c.model.as_str(),
    };
    info!(
        provider = ?config.chat.provider(),
        model = %model,
        whisper = %config.whisper.base_url,
        kokoro = %config.kokoro.base_url,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
