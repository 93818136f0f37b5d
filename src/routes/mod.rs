pub mod api;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::{AllowOrigin, Any, CorsLayer}, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{docs::ApiDoc, websocket::websocket_handler, AppState};
use api::create_api_routes;

/// Build the full application router
pub fn create_app(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state);

    Router::new()
        .route("/", get(|| async { "Server is running" }))
        .route("/ws", get(websocket_handler))
        // Mount API routes
        .nest("/api", create_api_routes())
        .with_state(app_state)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

fn cors_layer(app_state: &AppState) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match app_state.config.cors_origin_list() {
        None => layer.allow_origin(Any),
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin '{}'", origin);
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(origins))
        }
    }
}
