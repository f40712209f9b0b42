//! Axum Router Configuration
//!
//! This module defines the HTTP routing for the application: the WebSocket
//! endpoint, the health check and the static browser client.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let static_dir = app_state.static_dir.clone();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
        .nest_service("/static", ServeDir::new(&static_dir))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
}
