//! Progress parsing: raw child output into typed events.
//!
//! Two variants exist. The diagnostic-stream variant interprets the
//! transcode tool's stderr, which interleaves log lines with a
//! carriage-return-rewritten progress line. The line-buffered variant
//! classifies the download tool's stdout, where the injected progress
//! template prints exactly two byte counts per tick.

use std::sync::OnceLock;

use regex::Regex;

use mediarun_core::RunEvent;

/// Marker prefix on transcode diagnostic lines that carry progress
/// content.
pub const INFO_MARKER: &str = "[info]";

fn time_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=(\d+:\d+:\d+\.\d+)").expect("compile time pattern"))
}

fn duration_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Duration:\s*(\d+:\d+:\d+\.\d+)").expect("compile duration pattern")
    })
}

/// Parse a `HH:MM:SS.fraction` clock string into seconds.
///
/// Anything that is not exactly three colon-separated numeric
/// components maps to `0.0`; malformed input never raises.
pub fn parse_clock(clock: &str) -> f64 {
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return 0.0;
    }
    let mut components = [0.0f64; 3];
    for (slot, part) in components.iter_mut().zip(&parts) {
        match part.parse::<f64>() {
            Ok(value) => *slot = value,
            Err(_) => return 0.0,
        }
    }
    3600.0 * components[0] + 60.0 * components[1] + components[2]
}

/// Stream interpreter for the transcode tool's diagnostic output.
///
/// Transient, per-execution state: the current position and the total
/// duration, both unknown until seen. Discarded at stream end.
#[derive(Debug, Default)]
pub struct StderrProgressParser {
    position: Option<f64>,
    total: Option<f64>,
}

impl StderrProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one segment of the diagnostic stream (already split on
    /// newline or carriage return, delimiter stripped).
    ///
    /// `newline_terminated` distinguishes full log lines from
    /// CR-rewritten progress fragments; the total duration is only
    /// trusted on full lines, and captured at most once.
    ///
    /// Returns `None` for blank segments, `Progress` once both
    /// position and total are known, and `Log` with the verbatim line
    /// otherwise.
    pub fn feed(&mut self, line: &str, newline_terminated: bool) -> Option<RunEvent> {
        if line.trim().is_empty() {
            return None;
        }

        if line.starts_with(INFO_MARKER) {
            if let Some(captures) = time_pattern().captures(line) {
                self.position = Some(parse_clock(&captures[1]));
            } else if newline_terminated && self.total.is_none() {
                if let Some(captures) = duration_pattern().captures(line) {
                    self.total = Some(parse_clock(&captures[1]));
                }
            }

            if let (Some(position), Some(total)) = (self.position, self.total) {
                return Some(RunEvent::progress(position, total));
            }
        }

        Some(RunEvent::log(line))
    }
}

/// Classify one line of the download tool's stdout.
///
/// A line of exactly two whitespace-separated numeric tokens is a
/// progress tick (produced by the injected progress template); any
/// other non-empty line is a log line; empty lines yield nothing.
pub fn parse_download_line(line: &str) -> Option<RunEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() == 2 && parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())) {
        // All-digit tokens always parse as f64.
        let downloaded: f64 = parts[0].parse().unwrap_or(0.0);
        let total: f64 = parts[1].parse().unwrap_or(0.0);
        return Some(RunEvent::progress(downloaded, total));
    }

    Some(RunEvent::log(line))
}
