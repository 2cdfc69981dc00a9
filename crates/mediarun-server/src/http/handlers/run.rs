//! Command execution handler.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use tracing::{info, warn};

use crate::http::responses::{ErrorResponse, RunParams};
use crate::state::AppState;

/// Execute a media command and stream its lifecycle as SSE frames.
///
/// GET /api/run?command=<name>&args=<json array>
///
/// `args` is a URI-decoded, JSON-encoded flat array of strings. Build
/// and spawn failures surface here as plain JSON errors; anything that
/// happens after the process starts arrives on the stream itself.
pub async fn run_command(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunParams>,
) -> Response {
    let args = match parse_args(params.args.as_deref()) {
        Ok(args) => args,
        Err(response) => return response,
    };

    info!(command = %params.command, "Run requested");

    let frames = match state.runner.run(&params.command, args) {
        Ok(frames) => frames,
        Err(err) => {
            warn!(command = %params.command, error = %err, "Run rejected");
            let status = if err.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            return (
                status,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response();
        }
    };

    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
    (
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

/// Decode the optional `args` query parameter into a flat string list.
fn parse_args(raw: Option<&str>) -> Result<Option<Vec<String>>, Response> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(args) => Ok(Some(args)),
        Err(_) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Invalid 'args': expected a URI-decoded, JSON-encoded flat array of strings."
                    .to_string(),
            }),
        )
            .into_response()),
    }
}
