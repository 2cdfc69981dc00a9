//! Execution events emitted while a media command runs.

use serde::{Deserialize, Serialize};

/// Progress payload carried by [`RunEvent::Progress`].
///
/// For transcodes both fields are seconds of media time; for downloads
/// they are byte counts. Either way `downloaded / total` is the fraction
/// complete.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Amount processed so far.
    pub downloaded: f64,
    /// Total amount expected.
    pub total: f64,
}

/// A single event in an execution's ordered event stream.
///
/// Stream invariants:
/// - `Starting` is always first.
/// - The stream ends with exactly one of `Completed`/`ProcessError`,
///   unless the execution was cancelled, in which case no terminal
///   event is emitted.
/// - `Progress` appears only once both the current position and the
///   total are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunEvent {
    /// Execution is about to begin; carries the full command line and
    /// the passthrough arguments that survived command building.
    Starting {
        command: Vec<String>,
        args: Vec<String>,
    },
    /// A progress tick with known position and total.
    Progress { log: ProgressInfo },
    /// A raw diagnostic line from the child process.
    Log { line: String },
    /// The child process exited with code 0.
    Completed,
    /// The child process exited with a non-zero code.
    ProcessError { log: String },
}

impl RunEvent {
    /// Create a progress event.
    pub fn progress(downloaded: f64, total: f64) -> Self {
        Self::Progress {
            log: ProgressInfo { downloaded, total },
        }
    }

    /// Create a log event.
    pub fn log(line: impl Into<String>) -> Self {
        Self::Log { line: line.into() }
    }

    /// Create a process-error event.
    pub fn process_error(message: impl Into<String>) -> Self {
        Self::ProcessError {
            log: message.into(),
        }
    }

    /// The wire-level event type name used in SSE frames.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Starting { .. } => "starting",
            Self::Progress { .. } => "progress",
            Self::Log { .. } => "log",
            Self::Completed => "completed",
            Self::ProcessError { .. } => "process_error",
        }
    }

    /// Returns true if this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::ProcessError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_payload_shape() {
        let event = RunEvent::progress(12.5, 600.0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "progress");
        assert_eq!(json["log"]["downloaded"], 12.5);
        assert_eq!(json["log"]["total"], 600.0);
    }

    #[test]
    fn test_completed_payload_shape() {
        let json = serde_json::to_value(RunEvent::Completed).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "completed" }));
    }

    #[test]
    fn test_starting_payload_shape() {
        let event = RunEvent::Starting {
            command: vec!["ffmpeg".into(), "-i".into(), "in.mp4".into()],
            args: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "starting");
        assert_eq!(json["command"][0], "ffmpeg");
    }

    #[test]
    fn test_event_names() {
        assert_eq!(RunEvent::Completed.event_name(), "completed");
        assert_eq!(RunEvent::log("x").event_name(), "log");
        assert_eq!(RunEvent::process_error("x").event_name(), "process_error");
    }

    #[test]
    fn test_terminal_events() {
        assert!(RunEvent::Completed.is_terminal());
        assert!(RunEvent::process_error("boom").is_terminal());
        assert!(!RunEvent::log("line").is_terminal());
        assert!(!RunEvent::progress(0.0, 1.0).is_terminal());
    }
}
