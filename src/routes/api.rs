use crate::{handlers::{blank_template, diagnostics, health_check, ready_check}, AppState};
use axum::{routing::get, Router};

/// Create API routes
pub fn create_api_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/template", get(blank_template))
        .route("/v1/diagnostics", get(diagnostics))
}
