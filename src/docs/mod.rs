use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Relay diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Relay counters and process statistics", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Collaboration websocket
///
/// Upgrades to a WebSocket bound to one document. Frames are JSON envelopes
/// `{type, data?, noteId?, content?, userId?, timestamp?}` or, with
/// `encoding=binary`, a tag byte followed by the raw update.
#[utoipa::path(
    get,
    path = "/ws",
    params(
        ("documentId" = Option<String>, Query, description = "Document to join"),
        ("userId" = Option<String>, Query, description = "Peer identity shown to others"),
        ("encoding" = Option<String>, Query, description = "json (default) or binary")
    ),
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 400, description = "Not a websocket upgrade request")
    )
)]
#[allow(dead_code)]
pub async fn websocket_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        websocket_doc,
    ),
    components(
        schemas(HealthResponse, DiagnosticsResponse, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
