//! HTTP surface for mediarun.
//!
//! Provides endpoints for:
//! - Command execution with SSE streaming (`/api/run`)
//! - Task persistence (`/api/save`, `/api/all`, `/api/:task_id`)
//! - Health check (`/health`)
//! - Static assets (`/static`) and the index page (`/`)

use std::path::Path;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>, static_dir: &Path, index: &Path) -> Router {
    // CORS layer for browser clients on other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // API routes
        .route("/api/run", get(handlers::run_command))
        .route("/api/save", post(handlers::save_task))
        .route("/api/all", get(handlers::list_tasks))
        .route("/api/:task_id", get(handlers::get_task))
        // Observability routes
        .route("/health", get(handlers::health_check))
        // Static pages
        .route_service("/", ServeFile::new(index))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(
            AppState::new(),
            Path::new("static"),
            Path::new("pages/index.html"),
        )
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let response = router()
            .oneshot(Request::get("/api/no-such-task").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
