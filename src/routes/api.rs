use crate::{
    config::Config,
    docs::ApiDoc,
    handlers::{diagnostics, health_check, not_found, ready_check},
    websocket::handler::websocket_handler,
    ws::relay::Relay,
};
use axum::{http::{HeaderValue, Method}, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::{AllowOrigin, Any, CorsLayer}, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create API routes
pub fn create_api_routes() -> Router<Arc<Relay>> {
    Router::<Arc<Relay>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
}

/// The full application: websocket endpoint, API routes and Swagger UI.
pub fn create_app(relay: Arc<Relay>) -> Router {
    let cors = cors_layer(relay.config());
    Router::new()
        .route("/ws", get(websocket_handler))
        .nest("/api", create_api_routes())
        .fallback(not_found)
        .with_state(relay)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = config.cors_origin_list();
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::{to_bytes, Body}, http::{Request, StatusCode}};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        create_app(Arc::new(Relay::new(Config::default())))
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_and_ready_report_ok() {
        for uri in ["/api/health", "/api/ready"] {
            let (status, body) = get_json(uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
            assert_eq!(body["rooms"], 0);
        }
    }

    #[tokio::test]
    async fn diagnostics_reports_relay_counters() {
        let (status, body) = get_json("/api/v1/diagnostics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["n_rooms"], 0);
        assert_eq!(body["n_conn"], 0);
    }

    #[tokio::test]
    async fn unknown_routes_get_an_error_body() {
        let (status, body) = get_json("/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (status, body) = get_json("/api-docs/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/health"].is_object());
    }

    #[tokio::test]
    async fn plain_get_on_the_websocket_route_is_rejected() {
        let response = app()
            .oneshot(Request::builder().uri("/ws?documentId=doc1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
