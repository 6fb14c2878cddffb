use std::sync::Arc;
use axum::{extract::State, http::{StatusCode, Uri}, Json};
use crate::models::{ErrorResponse, HealthResponse};
use crate::ws::relay::Relay;
use tracing::debug;

/// Health check endpoint
pub async fn health_check(State(relay): State<Arc<Relay>>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        rooms: relay.room_count() as u32,
    })
}

/// Readiness check endpoint
pub async fn ready_check(State(relay): State<Arc<Relay>>) -> Json<HealthResponse> {
    debug!("Readiness check requested");
    // The relay holds no external dependencies; once routed it is ready.
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Service is ready".to_string(),
        rooms: relay.room_count() as u32,
    })
}

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> (StatusCode, Json<ErrorResponse>) {
    debug!("No route for {}", uri);
    let status = StatusCode::NOT_FOUND;
    (status, Json(ErrorResponse::new(status, format!("No route for {}", uri.path()))))
}
