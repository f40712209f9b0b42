//! Axum handlers for the plain HTTP routes.

use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

pub const SERVICE_NAME: &str = "panda9000";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub connections: usize,
}

/// Liveness check reporting the number of open WebSocket connections.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        connections: state.registry.len(),
    })
}
