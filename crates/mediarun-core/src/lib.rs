//! Mediarun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Process execution
//! - Runtime specifics
//!
//! All types here represent the core business domain of mediarun: the
//! events produced while a media command executes, and the metadata
//! record a finished execution leaves behind.

pub mod error;
pub mod event;
pub mod ids;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{ProgressInfo, RunEvent};
pub use ids::TaskId;
pub use task::TaskRecord;
