//! Error types for the streaming execution engine.
//!
//! All variants here are raised synchronously, before any event stream
//! is constructed, so the transport layer can still map them to a
//! request-level error. Once streaming has begun, a failing child
//! process is reported as the terminal `process_error` event instead
//! of an error, and cancellation is neither.

use thiserror::Error;

/// Errors that can occur while constructing an execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing arguments, detected before spawning.
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// The logical command name is not recognized.
    #[error("Unsupported command: {0}")]
    NotSupported(String),

    /// The executable is missing or could not be spawned.
    #[error("Failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),

    /// An event payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Returns true for errors caused by the caller's request rather
    /// than the server environment.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotSupported(_))
    }
}
