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
        (status = 200, description = "Coordination hub is running", body = HealthResponse),
        (status = 503, description = "Coordination hub is gone", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Blank diagram template
#[utoipa::path(
    get,
    path = "/api/v1/template",
    responses(
        (status = 200, description = "Blank BPMN document", body = TemplateResponse)
    )
)]
#[allow(dead_code)]
pub async fn blank_template_doc() {}

/// Diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Hub counters and host load", body = DiagnosticsResponse),
        (status = 503, description = "Coordination hub is gone", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        blank_template_doc,
        diagnostics_doc,
    ),
    components(
        schemas(HealthResponse, TemplateResponse, DiagnosticsResponse, ErrorResponse, Participant)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
