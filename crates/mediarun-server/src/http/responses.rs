//! HTTP request and response types.

use serde::{Deserialize, Serialize};

use mediarun_core::TaskRecord;

// ============================================================================
// Run types
// ============================================================================

/// Query parameters for the run endpoint.
#[derive(Debug, Deserialize)]
pub struct RunParams {
    /// Logical command name (`ffmpeg`, `yt_audio`, `yt_video`).
    pub command: String,

    /// URI-decoded, JSON-encoded flat array of argument strings.
    pub args: Option<String>,
}

// ============================================================================
// Task types
// ============================================================================

/// Query parameters for the task listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub offset: usize,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// Response body for the save endpoint.
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub saved: TaskRecord,
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
