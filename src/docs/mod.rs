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
        (status = 200, description = "Hub is accepting connections", body = HealthResponse),
        (status = 503, description = "Hub is not running", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Connection counters and resource usage
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current diagnostics", body = DiagnosticsResponse),
        (status = 503, description = "Hub is not running", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
    ),
    components(
        schemas(HealthResponse, DiagnosticsResponse, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
