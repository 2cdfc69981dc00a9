//! Event codec: typed events into push-protocol (SSE) wire frames.
//!
//! Each frame is an `event: <type>` line, one `data: <json>` line and
//! a blank line terminator.

use mediarun_core::RunEvent;

use crate::error::EngineError;

/// Encode one event as a complete SSE frame.
pub fn encode(event: &RunEvent) -> Result<String, EngineError> {
    let data = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {}\n\n", event.event_name(), data))
}
