use axum::Json;
use crate::models::{TemplateResponse, BLANK_DIAGRAM_XML};
use tracing::debug;

/// Blank diagram for seeding an editor that has no collaborative state yet
pub async fn blank_template() -> Json<TemplateResponse> {
    debug!("Blank template requested");
    Json(TemplateResponse {
        xml: BLANK_DIAGRAM_XML.to_string(),
    })
}
