//! Runners: compose command building, process supervision, progress
//! parsing and event multiplexing into one ordered frame stream per
//! execution.
//!
//! Each execution owns its invocation, child process, queue and tasks
//! exclusively; nothing is shared across concurrent executions. The
//! returned stream is lazy, single-pass and non-restartable; dropping
//! it cancels the execution and guarantees process teardown.

use std::process::ExitStatus;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use mediarun_core::RunEvent;

use crate::command::{
    build_download, build_transcode, DownloadConfig, DownloadMode, Invocation,
    TRANSCODE_EXECUTABLE,
};
use crate::error::EngineError;
use crate::process::{OutputCapture, ProcessHandle};
use crate::progress::{parse_download_line, StderrProgressParser};
use crate::sse;

/// Logical command names with this prefix select the download runner.
pub const DOWNLOAD_PREFIX: &str = "yt_";

/// Logical command name selecting audio-only download mode.
const DOWNLOAD_AUDIO_NAME: &str = "yt_audio";

/// Lazy, single-pass sequence of encoded SSE frames for one execution.
pub type EventFrames = UnboundedReceiverStream<String>;

/// Item on the per-execution ordered queue that fans in the diagnostic
/// reader and the exit watcher.
enum QueueItem {
    /// A typed event produced by the progress parser.
    Event(RunEvent),
    /// End-of-stream marker pushed by the exit watcher; carries the
    /// final exit status.
    Exited(std::io::Result<ExitStatus>),
}

/// Entry point for executing media commands.
///
/// Holds the immutable download templates built once at startup;
/// `run` dispatches on the logical command name and returns the frame
/// stream for one execution.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    download_config: DownloadConfig,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the download templates (primarily for tests).
    pub fn with_download_config(mut self, config: DownloadConfig) -> Self {
        self.download_config = config;
        self
    }

    /// Execute a logical command with a flat argument list.
    ///
    /// Validation, command building and the spawn all happen here,
    /// before any stream exists, so their failures surface as
    /// request-level errors. Once the stream is returned, failures
    /// only ever arrive as the terminal `process_error` frame.
    pub fn run(&self, name: &str, args: Option<Vec<String>>) -> Result<EventFrames, EngineError> {
        let args = args.unwrap_or_default();
        let name = name.trim();

        if name.starts_with(DOWNLOAD_PREFIX) {
            let mode = if name == DOWNLOAD_AUDIO_NAME {
                DownloadMode::Audio
            } else {
                DownloadMode::Video
            };
            info!(command = name, mode = ?mode, "Dispatching download");
            let (invocation, passthrough) = build_download(mode, &self.download_config, &args)?;
            download_frames(&invocation, passthrough)
        } else if name.eq_ignore_ascii_case(TRANSCODE_EXECUTABLE) {
            info!(command = name, "Dispatching transcode");
            let (invocation, passthrough) = build_transcode(&args)?;
            transcode_frames(&invocation, passthrough)
        } else {
            Err(EngineError::NotSupported(name.to_string()))
        }
    }
}

/// Spawn a transcode invocation and return its frame stream.
fn transcode_frames(
    invocation: &Invocation,
    passthrough: Vec<String>,
) -> Result<EventFrames, EngineError> {
    let starting = sse::encode(&RunEvent::Starting {
        command: invocation.command_line(),
        args: passthrough,
    })?;

    let mut handle = ProcessHandle::spawn(invocation, OutputCapture::Stderr)?;
    let stderr = handle
        .take_stderr()
        .ok_or_else(|| EngineError::Spawn(std::io::Error::other("stderr pipe missing")))?;

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    tokio::spawn(drive_transcode(handle, stderr, starting, out_tx));
    Ok(UnboundedReceiverStream::new(out_rx))
}

/// Spawn a download invocation and return its frame stream.
fn download_frames(
    invocation: &Invocation,
    passthrough: Vec<String>,
) -> Result<EventFrames, EngineError> {
    let starting = sse::encode(&RunEvent::Starting {
        command: invocation.command_line(),
        args: passthrough,
    })?;

    let mut handle = ProcessHandle::spawn(invocation, OutputCapture::StdoutAndStderr)?;
    let stdout = handle
        .take_stdout()
        .ok_or_else(|| EngineError::Spawn(std::io::Error::other("stdout pipe missing")))?;
    let stderr = handle
        .take_stderr()
        .ok_or_else(|| EngineError::Spawn(std::io::Error::other("stderr pipe missing")))?;

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    tokio::spawn(drive_download(handle, stdout, stderr, starting, out_tx));
    Ok(UnboundedReceiverStream::new(out_rx))
}

/// Transcode driver: fans in the diagnostic reader and the exit
/// watcher through one ordered queue, forwarding frames until the
/// end-of-stream marker, then emits the terminal event.
async fn drive_transcode(
    handle: ProcessHandle,
    stderr: ChildStderr,
    starting: String,
    out_tx: UnboundedSender<String>,
) {
    let _ = out_tx.send(starting);

    let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();

    let reader_tx = queue_tx.clone();
    let reader = tokio::spawn(pump_diagnostics(stderr, reader_tx));

    // The diagnostic stream never ends before process exit, so a
    // dedicated watcher unblocks the queue consumer when it does.
    // Cancellation is routed through this task too: only the owner of
    // the child may signal it, so a pid that has already been reaped
    // (and possibly reused) is never signalled.
    let watcher = tokio::spawn(async move {
        let mut handle = handle;
        tokio::select! {
            status = handle.wait() => {
                let _ = queue_tx.send(QueueItem::Exited(status));
            }
            _ = cancel_rx => {
                handle.cancel().await;
                let status = handle.wait().await;
                let _ = queue_tx.send(QueueItem::Exited(status));
            }
        }
    });

    let mut exit = None;
    loop {
        tokio::select! {
            item = queue_rx.recv() => match item {
                Some(QueueItem::Event(event)) => {
                    if forward(&event, &out_tx).is_err() {
                        cancel_transcode(cancel_tx, &mut queue_rx, reader, watcher).await;
                        return;
                    }
                }
                Some(QueueItem::Exited(status)) => {
                    exit = Some(status);
                    break;
                }
                None => break,
            },
            _ = out_tx.closed() => {
                cancel_transcode(cancel_tx, &mut queue_rx, reader, watcher).await;
                return;
            }
        }
    }

    reader.abort();
    let _ = reader.await;
    let _ = watcher.await;

    let terminal = match exit {
        Some(Ok(status)) if status.success() => RunEvent::Completed,
        Some(Ok(status)) => match status.code() {
            // The diagnostic stream was consumed for progress parsing,
            // so only a generic message is available here.
            Some(code) => RunEvent::process_error(format!("ffmpeg exited with code {code}")),
            None => RunEvent::process_error("ffmpeg terminated by signal"),
        },
        Some(Err(e)) => RunEvent::process_error(format!("failed to reap ffmpeg: {e}")),
        None => RunEvent::process_error("ffmpeg exited unexpectedly"),
    };
    let _ = forward(&terminal, &out_tx);
}

/// Read the diagnostic stream split on newline OR carriage return (the
/// transcode tool rewrites its progress line with CRs), feeding each
/// segment through the parser into the queue.
async fn pump_diagnostics(stderr: ChildStderr, queue_tx: UnboundedSender<QueueItem>) {
    let mut parser = StderrProgressParser::new();
    let mut reader = BufReader::new(stderr);
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let mut consumed = 0;
        let mut segment = None;
        let mut eof = false;
        {
            let chunk = match reader.fill_buf().await {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!(error = %e, "Diagnostic stream read failed");
                    break;
                }
            };
            if chunk.is_empty() {
                eof = true;
            } else if let Some(pos) = chunk.iter().position(|&b| b == b'\n' || b == b'\r') {
                pending.extend_from_slice(&chunk[..pos]);
                segment = Some((
                    String::from_utf8_lossy(&pending).into_owned(),
                    chunk[pos] == b'\n',
                ));
                pending.clear();
                consumed = pos + 1;
            } else {
                pending.extend_from_slice(chunk);
                consumed = chunk.len();
            }
        }
        reader.consume(consumed);

        if eof {
            if !pending.is_empty() {
                let line = String::from_utf8_lossy(&pending).into_owned();
                if let Some(event) = parser.feed(&line, false) {
                    let _ = queue_tx.send(QueueItem::Event(event));
                }
            }
            break;
        }

        if let Some((line, newline)) = segment {
            if let Some(event) = parser.feed(&line, newline) {
                if queue_tx.send(QueueItem::Event(event)).is_err() {
                    break;
                }
            }
        }
    }
}

/// Cancel a transcode execution whose child lives inside the watcher
/// task: signal the watcher, which performs the graceful-then-forceful
/// termination on the child it owns, then drain both background tasks.
/// No terminal frame is emitted.
async fn cancel_transcode(
    cancel_tx: oneshot::Sender<()>,
    queue_rx: &mut UnboundedReceiver<QueueItem>,
    reader: JoinHandle<()>,
    watcher: JoinHandle<()>,
) {
    info!("Stream consumer gone, cancelling transcode");
    // If the watcher already reaped the child this send fails and the
    // exit marker is sitting in the queue; either way draining to the
    // marker confirms the process is gone before teardown.
    let _ = cancel_tx.send(());
    wait_for_exit(queue_rx).await;
    reader.abort();
    let _ = reader.await;
    let _ = watcher.await;
}

/// Drain the queue until the exit watcher's end-of-stream marker.
async fn wait_for_exit(queue_rx: &mut UnboundedReceiver<QueueItem>) {
    while let Some(item) = queue_rx.recv().await {
        if matches!(item, QueueItem::Exited(_)) {
            return;
        }
    }
}

/// Download driver: no fan-in is needed because stdout reaches natural
/// EOF at process exit; the exit code is then awaited inline.
async fn drive_download(
    mut handle: ProcessHandle,
    stdout: ChildStdout,
    stderr: ChildStderr,
    starting: String,
    out_tx: UnboundedSender<String>,
) {
    let _ = out_tx.send(starting);

    // Drain stderr concurrently so the pipe cannot fill up; the
    // captured content feeds the terminal error message.
    let stderr_task = tokio::spawn(async move {
        let mut captured = String::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_string(&mut captured).await;
        captured
    });

    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(event) = parse_download_line(&line) {
                        if forward(&event, &out_tx).is_err() {
                            cancel_download(handle, stderr_task).await;
                            return;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "Download output read failed");
                    break;
                }
            },
            _ = out_tx.closed() => {
                cancel_download(handle, stderr_task).await;
                return;
            }
        }
    }

    // The consumer can still disconnect while the exit code is being
    // awaited; that must cancel the child rather than let it run to
    // natural exit.
    let status = tokio::select! {
        status = handle.wait() => status,
        _ = out_tx.closed() => {
            cancel_download(handle, stderr_task).await;
            return;
        }
    };
    let captured = stderr_task.await.unwrap_or_default();

    let terminal = match status {
        Ok(status) if status.success() => RunEvent::Completed,
        Ok(status) => {
            let message = if captured.trim().is_empty() {
                match status.code() {
                    Some(code) => format!("yt-dlp exited with code {code}"),
                    None => "yt-dlp terminated by signal".to_string(),
                }
            } else {
                captured
            };
            RunEvent::process_error(message)
        }
        Err(e) => RunEvent::process_error(format!("failed to reap yt-dlp: {e}")),
    };
    let _ = forward(&terminal, &out_tx);
}

/// Cancel a download execution: the handle is owned inline, so the
/// supervisor's graceful-then-forceful cancel applies directly.
async fn cancel_download(mut handle: ProcessHandle, stderr_task: JoinHandle<String>) {
    info!(pid = ?handle.pid(), "Stream consumer gone, cancelling download");
    handle.cancel().await;
    stderr_task.abort();
    let _ = stderr_task.await;
}

/// Encode one event into a frame. A non-terminal event that fails to
/// encode is dropped, but a terminal one is replaced with a generic
/// `process_error` frame: the stream must never end without its
/// terminal frame.
fn encode_frame(event: &RunEvent) -> Option<String> {
    match sse::encode(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "Failed to encode event");
            if event.is_terminal() {
                sse::encode(&RunEvent::process_error("event serialization failed")).ok()
            } else {
                None
            }
        }
    }
}

/// Encode and forward one event; an error means the consumer dropped
/// the stream.
fn forward(event: &RunEvent, out_tx: &UnboundedSender<String>) -> Result<(), ()> {
    match encode_frame(event) {
        Some(frame) => out_tx.send(frame).map_err(|_| ()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn shell(script: &str) -> Invocation {
        Invocation {
            executable: "sh".to_string(),
            argv: vec!["-c".to_string(), script.to_string()],
        }
    }

    async fn collect_event_names(mut frames: EventFrames) -> Vec<String> {
        let mut names = Vec::new();
        while let Some(frame) = frames.next().await {
            let name = frame
                .lines()
                .next()
                .and_then(|l| l.strip_prefix("event: "))
                .unwrap_or("?")
                .to_string();
            names.push(name);
        }
        names
    }

    #[test]
    fn test_unsupported_command() {
        let err = Runner::new().run("unsupported_tool", Some(vec![])).unwrap_err();
        assert!(matches!(err, EngineError::NotSupported(_)));
    }

    #[test]
    fn test_transcode_validation_before_spawn() {
        let err = Runner::new()
            .run("ffmpeg", Some(vec!["only_one_token".to_string()]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_dispatch_is_case_insensitive() {
        // Reaches the transcode builder, which rejects the short list.
        let err = Runner::new()
            .run("FFMPEG", Some(vec!["x".to_string()]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_forward_detects_closed_consumer() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert!(forward(&RunEvent::Completed, &tx).is_err());

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(forward(&RunEvent::Completed, &tx).is_ok());
        assert!(rx.try_recv().unwrap().starts_with("event: completed"));
    }

    #[test]
    fn test_encode_frame_handles_nonfinite_progress() {
        // serde_json writes non-finite floats as null rather than
        // failing, so even this payload still yields a frame.
        let frame = encode_frame(&RunEvent::progress(f64::NAN, f64::INFINITY)).unwrap();
        assert!(frame.starts_with("event: progress"));
    }

    #[test]
    fn test_download_requires_url() {
        let err = Runner::new().run("yt_audio", None).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transcode_stream_order_and_completion() {
        let script = concat!(
            "printf '[info]   Duration: 00:00:10.00, start: 0.0\\n' 1>&2; ",
            "printf '[info] frame=1 time=00:00:01.00 bitrate=1k\\r' 1>&2; ",
            "printf '[info] frame=2 time=00:00:02.00 bitrate=1k\\n' 1>&2; ",
            "sleep 1; exit 0"
        );
        let frames = transcode_frames(&shell(script), vec![]).unwrap();
        let names = collect_event_names(frames).await;
        assert_eq!(names, vec!["starting", "log", "progress", "progress", "completed"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transcode_nonzero_exit_is_process_error() {
        let script = "printf 'boom\\n' 1>&2; sleep 1; exit 3";
        let mut frames = transcode_frames(&shell(script), vec![]).unwrap();

        let mut last = None;
        while let Some(frame) = frames.next().await {
            last = Some(frame);
        }
        let last = last.unwrap();
        assert!(last.starts_with("event: process_error"));
        assert!(last.contains("exited with code 3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_stream_order_and_completion() {
        let script = "printf '100 1000\\nDestination: x.mp3\\n200 1000\\n'; exit 0";
        let frames = download_frames(&shell(script), vec![]).unwrap();
        let names = collect_event_names(frames).await;
        assert_eq!(names, vec!["starting", "progress", "log", "progress", "completed"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_failure_carries_captured_stderr() {
        let script = "printf 'ERROR: no video\\n' 1>&2; exit 2";
        let mut frames = download_frames(&shell(script), vec![]).unwrap();

        let mut last = None;
        while let Some(frame) = frames.next().await {
            last = Some(frame);
        }
        let last = last.unwrap();
        assert!(last.starts_with("event: process_error"));
        assert!(last.contains("ERROR: no video"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transcode_drop_terminates_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("terminated");
        let script = format!(
            "trap 'touch {}; exit 0' TERM; sleep 30 & wait",
            marker.display()
        );
        let mut frames = transcode_frames(&shell(&script), vec![]).unwrap();

        let first = frames.next().await.unwrap();
        assert!(first.starts_with("event: starting"));
        drop(frames);

        // The driver delivers SIGTERM once it notices the consumer is
        // gone; the trap handler records it.
        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(marker.exists(), "child was not terminated after drop");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transcode_drop_after_exit_is_clean() {
        let mut frames = transcode_frames(&shell("exit 0"), vec![]).unwrap();
        let first = frames.next().await.unwrap();
        assert!(first.starts_with("event: starting"));

        // Let the child exit and its exit marker reach the queue, then
        // disconnect while the marker is still unconsumed.
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(frames);

        // Teardown must not signal the reaped pid; a fresh execution on
        // the same runtime still completes normally.
        let names =
            collect_event_names(transcode_frames(&shell("sleep 1; exit 0"), vec![]).unwrap())
                .await;
        assert_eq!(names.last().map(String::as_str), Some("completed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_drop_during_exit_wait_terminates_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("terminated");
        // Close stdout immediately so the driver reaches the exit wait,
        // then hold the process open until it is told to terminate.
        let script = format!(
            "exec 1>&-; trap 'touch {}; exit 0' TERM; sleep 30 & wait",
            marker.display()
        );
        let mut frames = download_frames(&shell(&script), vec![]).unwrap();

        let first = frames.next().await.unwrap();
        assert!(first.starts_with("event: starting"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(frames);

        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(
            marker.exists(),
            "child was not terminated after drop during exit wait"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_drop_terminates_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("terminated");
        let script = format!(
            "trap 'touch {}; exit 0' TERM; sleep 30 & wait",
            marker.display()
        );
        let mut frames = download_frames(&shell(&script), vec![]).unwrap();

        let first = frames.next().await.unwrap();
        assert!(first.starts_with("event: starting"));
        drop(frames);

        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(marker.exists(), "child was not terminated after drop");
    }
}
