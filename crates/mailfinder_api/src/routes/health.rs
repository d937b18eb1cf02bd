//! Health check route

use crate::AppState;
use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub run_active: bool,
    pub timestamp: String,
}

/// Health check endpoint - GET /health
///
/// Returns 200 OK with service information and whether a run is in flight.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        run_active: state.supervisor.is_running(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
