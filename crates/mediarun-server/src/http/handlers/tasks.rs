//! Task persistence handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use mediarun_core::{CoreError, TaskId, TaskRecord};

use crate::http::responses::{ErrorResponse, ListParams, SaveResponse};
use crate::state::AppState;

/// Persist a finished task's metadata.
///
/// POST /api/save
pub async fn save_task(
    State(state): State<Arc<AppState>>,
    Json(record): Json<TaskRecord>,
) -> Response {
    match state.save_task(record).await {
        Ok(saved) => {
            info!(task_id = %saved.id, command = %saved.command, "Task saved");
            Json(SaveResponse { saved }).into_response()
        }
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

/// List saved tasks, oldest first.
///
/// GET /api/all?offset=<n>&limit=<n>
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Json<Vec<TaskRecord>> {
    Json(state.list_tasks(params.offset, params.limit).await)
}

/// Fetch one saved task by id.
///
/// GET /api/:task_id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    match state.get_task(&TaskId::new(&task_id)).await {
        Ok(record) => Json(record).into_response(),
        Err(err @ CoreError::TaskNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}
