//! Task metadata persisted after an execution finishes.

use crate::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a finished execution, as stored by the surrounding
/// system after the event stream completes.
///
/// The engine never creates or reads these; the client submits one via
/// the save endpoint once it has consumed the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task identifier (assigned by the client).
    pub id: TaskId,

    /// Logical command name that was executed (e.g. `ffmpeg`, `yt_audio`).
    pub command: String,

    /// Flat argument list the command was invoked with.
    #[serde(default)]
    pub args: Vec<String>,

    /// Final status as observed by the client (`completed`,
    /// `process_error`, ...).
    pub status: String,

    /// Accumulated log lines from the event stream.
    #[serde(default)]
    pub full_log: Vec<String>,

    /// Whether the record has been durably saved.
    #[serde(default = "default_saved")]
    pub saved: bool,

    /// When the record was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_saved() -> bool {
    true
}

impl TaskRecord {
    /// Create a new record for a finished execution.
    pub fn new(
        id: TaskId,
        command: impl Into<String>,
        args: Vec<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id,
            command: command.into(),
            args,
            status: status.into(),
            full_log: Vec::new(),
            saved: true,
            created_at: Utc::now(),
        }
    }

    /// Builder method to attach the accumulated log.
    pub fn with_log(mut self, full_log: Vec<String>) -> Self {
        self.full_log = full_log;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let record = TaskRecord::new(
            TaskId::new("t-1"),
            "yt_audio",
            vec!["https://example.com/v".into()],
            "completed",
        )
        .with_log(vec!["[info] done".into()]);

        let json = serde_json::to_string(&record).unwrap();
        let back: TaskRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{"id":"t-2","command":"ffmpeg","status":"completed"}"#;
        let record: TaskRecord = serde_json::from_str(json).unwrap();
        assert!(record.args.is_empty());
        assert!(record.full_log.is_empty());
        assert!(record.saved);
    }
}
