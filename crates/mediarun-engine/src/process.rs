//! Child-process lifecycle: spawn, wait, graceful-then-forceful
//! termination.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

use crate::command::Invocation;
use crate::error::EngineError;

/// Bounded wait after a graceful termination request before escalating
/// to a forceful kill.
pub const GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Which output streams of the child are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCapture {
    /// Capture stderr only (transcode: diagnostics and progress are
    /// written there).
    Stderr,
    /// Capture both stdout and stderr (download: progress on stdout,
    /// failure details on stderr).
    StdoutAndStderr,
}

/// Lifecycle state of a supervised child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Terminating,
    /// Terminated; carries the exit code if the process exited
    /// normally (None when killed by a signal).
    Exited(Option<i32>),
}

/// Owns one child process for the duration of one execution.
///
/// A handle is never shared across executions; the runner either keeps
/// it for inline supervision (download) or moves it into a dedicated
/// exit-watcher task (transcode) that also performs cancellation on
/// request, so termination always goes through the owner of the child.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    state: ProcessState,
}

impl ProcessHandle {
    /// Spawn the invocation with the requested capture configuration.
    ///
    /// Stdin is always null; the child never inherits the caller's
    /// input stream. Fails with a spawn error before any event stream
    /// exists.
    pub fn spawn(invocation: &Invocation, capture: OutputCapture) -> Result<Self, EngineError> {
        let mut command = Command::new(&invocation.executable);
        command
            .args(&invocation.argv)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match capture {
            OutputCapture::Stderr => command.stdout(Stdio::null()),
            OutputCapture::StdoutAndStderr => command.stdout(Stdio::piped()),
        };

        let child = command.spawn().map_err(|e| {
            warn!(executable = %invocation.executable, error = %e, "Failed to spawn process");
            EngineError::Spawn(e)
        })?;

        debug!(
            executable = %invocation.executable,
            pid = ?child.id(),
            "Process spawned"
        );

        Ok(Self {
            child,
            state: ProcessState::Running,
        })
    }

    /// OS process id, if the process has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Take the captured stdout handle.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the captured stderr handle.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Suspend until the child terminates.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        let status = self.child.wait().await?;
        self.state = ProcessState::Exited(status.code());
        Ok(status)
    }

    /// Terminate the child: graceful request first, then a forceful
    /// kill if it is still alive after [`GRACE_PERIOD`]. Always leaves
    /// the handle in `Exited`.
    pub async fn cancel(&mut self) {
        if let ProcessState::Exited(_) = self.state {
            return;
        }
        self.state = ProcessState::Terminating;

        if let Some(pid) = self.child.id() {
            terminate(pid);
        }

        match tokio::time::timeout(GRACE_PERIOD, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(code = ?status.code(), "Process exited after graceful termination");
                self.state = ProcessState::Exited(status.code());
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Error waiting for terminated process");
                self.state = ProcessState::Exited(None);
            }
            Err(_) => {
                warn!(pid = ?self.child.id(), "Grace period elapsed, killing process");
                if let Err(e) = self.child.start_kill() {
                    warn!(error = %e, "Failed to kill process");
                }
                let code = match self.child.wait().await {
                    Ok(status) => status.code(),
                    Err(_) => None,
                };
                self.state = ProcessState::Exited(code);
            }
        }
    }
}

/// Send a graceful termination request to a process by pid.
#[cfg(unix)]
fn terminate(pid: u32) {
    // SAFETY: plain kill(2) on a pid we spawned.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

/// Send a graceful termination request to a process by pid.
#[cfg(not(unix))]
fn terminate(_pid: u32) {}
