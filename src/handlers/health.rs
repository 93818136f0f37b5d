use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{debug, error};

use crate::models::{ErrorResponse, HealthResponse};
use crate::AppState;

/// Health check endpoint
pub async fn health_check(State(app_state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        service: app_state.config.service_name.clone(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint: ready while the hub task answers
pub async fn ready_check(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<ErrorResponse>)> {
    debug!("Readiness check requested");
    match app_state.hub.stats().await {
        Ok(_) => Ok(Json(HealthResponse {
            status: "ok".to_string(),
            service: app_state.config.service_name.clone(),
            message: "Service is ready".to_string(),
        })),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            Err(ErrorResponse::reply(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}
