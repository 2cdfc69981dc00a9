//! Streaming execution engine for mediarun.
//!
//! Executes long-running media commands (ffmpeg transcodes, yt-dlp
//! downloads) as supervised child processes and interprets their raw
//! output into an ordered stream of typed events, encoded as SSE
//! frames.
//!
//! # Example
//!
//! ```rust,no_run
//! use mediarun_engine::Runner;
//! use tokio_stream::StreamExt;
//!
//! async fn transcode() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = Runner::new();
//!     let mut frames = runner.run(
//!         "ffmpeg",
//!         Some(vec!["-i".into(), "in.mp4".into(), "out.mkv".into()]),
//!     )?;
//!
//!     while let Some(frame) = frames.next().await {
//!         print!("{frame}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod error;
pub mod process;
pub mod progress;
pub mod runner;
pub mod sse;

// Re-export main types
pub use command::{DownloadConfig, DownloadMode, Invocation};
pub use error::EngineError;
pub use process::{OutputCapture, ProcessHandle, ProcessState, GRACE_PERIOD};
pub use runner::{EventFrames, Runner};
