//! Health check handler.

use axum::{response::IntoResponse, Json};

/// Health check endpoint.
///
/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
