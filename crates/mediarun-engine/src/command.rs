//! Command building: logical command name + flat argument list into a
//! concrete process invocation.
//!
//! Builders are pure with respect to the process environment: they
//! resolve paths lexically and never touch the filesystem, so every
//! argument error is caught before a child is spawned.

use std::path::{Component, Path, PathBuf};

use crate::error::EngineError;

/// Executable name for the transcode tool.
pub const TRANSCODE_EXECUTABLE: &str = "ffmpeg";

/// Executable name for the download tool.
pub const DOWNLOAD_EXECUTABLE: &str = "yt-dlp";

/// A concrete process invocation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Executable to spawn (resolved via PATH).
    pub executable: String,
    /// Ordered argument vector, not including the executable.
    pub argv: Vec<String>,
}

impl Invocation {
    /// Full command line including the executable, as reported in the
    /// `starting` event.
    pub fn command_line(&self) -> Vec<String> {
        let mut line = Vec::with_capacity(self.argv.len() + 1);
        line.push(self.executable.clone());
        line.extend(self.argv.iter().cloned());
        line
    }
}

/// Download flavor, selected by the logical command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Audio-only extraction.
    Audio,
    /// Video plus audio.
    Video,
}

/// Fixed command templates for the download tool.
///
/// Built once at startup and passed by reference into the builder;
/// never mutated at runtime. The progress template forces the tool to
/// print exactly two whitespace-separated byte counts per tick, which
/// is what the line-buffered progress parser expects.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Flags shared by both modes.
    pub base_flags: Vec<String>,
    /// Extra flags for audio-only mode.
    pub audio_flags: Vec<String>,
    /// Extra flags for video mode.
    pub video_flags: Vec<String>,
    /// Output filename template, joined under the destination directory.
    pub output_template: String,
    /// Default destination root for audio downloads.
    pub audio_root: PathBuf,
    /// Default destination root for video downloads.
    pub video_root: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            base_flags: [
                "-w",
                "-N",
                "4",
                "--restrict-filename",
                "--embed-thumbnail",
                "--embed-chapters",
                "--add-metadata",
                "--embed-subs",
                "--newline",
                "--progress-template",
                "%(progress.downloaded_bytes)s %(progress.total_bytes)s",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            audio_flags: ["-f", "ba", "--audio-format", "mp3", "-x"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            video_flags: ["-f", "bv+ba", "--audio-format", "mp3"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_template: "%(title)s [%(uploader)s@%(extractor)s] [%(id)s].%(ext)s".to_string(),
            audio_root: home.join("Music").join("%(extractor)s"),
            video_root: home.join("Videos").join("%(extractor)s"),
        }
    }
}

impl DownloadConfig {
    /// Default destination root for the given mode.
    pub fn default_root(&self, mode: DownloadMode) -> &Path {
        match mode {
            DownloadMode::Audio => &self.audio_root,
            DownloadMode::Video => &self.video_root,
        }
    }

    /// Flags specific to the given mode.
    fn mode_flags(&self, mode: DownloadMode) -> &[String] {
        match mode {
            DownloadMode::Audio => &self.audio_flags,
            DownloadMode::Video => &self.video_flags,
        }
    }
}

/// Build a transcode invocation from a flat token list.
///
/// The last token is the output path; earlier tokens may contain
/// `-i <path>` pairs interleaved with passthrough flags. Returns the
/// invocation and the passthrough remainder (reported in the
/// `starting` event's `args`).
pub fn build_transcode(args: &[String]) -> Result<(Invocation, Vec<String>), EngineError> {
    if args.len() < 2 {
        return Err(EngineError::Validation(
            "at least one input and one output stream required".to_string(),
        ));
    }

    let mut tokens = args.to_vec();
    let output = tokens
        .pop()
        .ok_or_else(|| EngineError::Validation("missing output stream".to_string()))?;
    let output = resolve_path(&output);

    let mut inputs: Vec<String> = Vec::new();
    let mut remaining: Vec<String> = Vec::new();
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        if token == "-i" {
            match iter.next() {
                Some(input) => inputs.push(input),
                None => {
                    return Err(EngineError::Validation(
                        "'-i' without input stream".to_string(),
                    ))
                }
            }
        } else {
            remaining.push(token);
        }
    }

    if inputs.is_empty() {
        // Fallback: assume the first remaining token is the input.
        if remaining.is_empty() {
            return Err(EngineError::Validation(
                "at least one input stream required".to_string(),
            ));
        }
        inputs.push(remaining.remove(0));
    }

    let mut argv: Vec<String> = ["-hide_banner", "-loglevel", "level+info"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for input in inputs {
        argv.push("-i".to_string());
        argv.push(input);
    }
    // Refuse to overwrite an existing output file.
    argv.push("-n".to_string());
    argv.extend(remaining.iter().cloned());
    argv.push(output.to_string_lossy().into_owned());

    Ok((
        Invocation {
            executable: TRANSCODE_EXECUTABLE.to_string(),
            argv,
        },
        remaining,
    ))
}

/// Build a download invocation from a flat token list.
///
/// The first token is the source URL. If the next remaining token does
/// not start with `-`, it overrides the mode's default destination
/// directory. Empty tokens are dropped; the URL always goes last.
pub fn build_download(
    mode: DownloadMode,
    config: &DownloadConfig,
    args: &[String],
) -> Result<(Invocation, Vec<String>), EngineError> {
    let mut tokens = args.to_vec();
    if tokens.is_empty() {
        return Err(EngineError::Validation(
            "a video URL is required".to_string(),
        ));
    }
    let url = tokens.remove(0);

    let mut destination = config.default_root(mode).to_path_buf();
    if tokens.first().is_some_and(|t| !t.starts_with('-')) {
        destination = PathBuf::from(tokens.remove(0));
    }
    let output = resolve_path(&destination.to_string_lossy()).join(&config.output_template);

    let mut argv: Vec<String> = config.base_flags.clone();
    argv.extend(config.mode_flags(mode).iter().cloned());
    argv.push("-o".to_string());
    argv.push(output.to_string_lossy().into_owned());
    argv.extend(tokens.iter().cloned());
    argv.push(url);
    argv.retain(|token| !token.is_empty());

    Ok((
        Invocation {
            executable: DOWNLOAD_EXECUTABLE.to_string(),
            argv,
        },
        tokens,
    ))
}

/// Expand a leading `~`, absolutize against the working directory and
/// normalize `.`/`..` components, all without touching the filesystem.
fn resolve_path(raw: &str) -> PathBuf {
    let expanded = expand_home(raw);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    };
    normalize(&absolute)
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_transcode_multiple_inputs() {
        let args = strings(&[
            "-i",
            "/tmp/a.mp4",
            "-i",
            "/tmp/b.wav",
            "-c:v",
            "libx264",
            "/tmp/out.mkv",
        ]);
        let (invocation, remaining) = build_transcode(&args).unwrap();

        assert_eq!(invocation.executable, "ffmpeg");
        let argv = &invocation.argv;
        let input_pairs: Vec<usize> = argv
            .iter()
            .enumerate()
            .filter(|(_, t)| t.as_str() == "-i")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(input_pairs.len(), 2);
        assert_eq!(argv[input_pairs[0] + 1], "/tmp/a.mp4");
        assert_eq!(argv[input_pairs[1] + 1], "/tmp/b.wav");
        assert!(argv.contains(&"-n".to_string()));
        assert_eq!(argv.last().unwrap(), "/tmp/out.mkv");
        assert_eq!(remaining, strings(&["-c:v", "libx264"]));
    }

    #[test]
    fn test_transcode_first_token_fallback_input() {
        let args = strings(&["/tmp/in.mp4", "/tmp/out.mp4"]);
        let (invocation, remaining) = build_transcode(&args).unwrap();

        let argv = &invocation.argv;
        let i = argv.iter().position(|t| t == "-i").unwrap();
        assert_eq!(argv[i + 1], "/tmp/in.mp4");
        assert_eq!(argv.last().unwrap(), "/tmp/out.mp4");
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_transcode_too_few_tokens() {
        let err = build_transcode(&strings(&["only_one_token"])).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_transcode_dangling_input_flag() {
        // "-i" consumes the only other token as its value, leaving no input.
        let err = build_transcode(&strings(&["/tmp/in.mp4", "-i", "/tmp/out.mp4"])).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_transcode_output_path_normalized() {
        let args = strings(&["/tmp/in.mp4", "/tmp/sub/../out.mp4"]);
        let (invocation, _) = build_transcode(&args).unwrap();
        assert_eq!(invocation.argv.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn test_download_requires_url() {
        let err = build_download(DownloadMode::Audio, &DownloadConfig::default(), &[]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_download_default_roots_differ_by_mode() {
        let config = DownloadConfig::default();
        let args = strings(&["https://x/y"]);

        let (audio, _) = build_download(DownloadMode::Audio, &config, &args).unwrap();
        let (video, _) = build_download(DownloadMode::Video, &config, &args).unwrap();

        let audio_out = output_arg(&audio);
        let video_out = output_arg(&video);
        assert!(audio_out.contains("Music"), "got {audio_out}");
        assert!(video_out.contains("Videos"), "got {video_out}");
        assert!(audio_out.ends_with(&config.output_template));
    }

    #[test]
    fn test_download_directory_override() {
        let config = DownloadConfig::default();
        let args = strings(&["https://x/y", "/tmp/media", "--no-playlist"]);
        let (invocation, remaining) = build_download(DownloadMode::Video, &config, &args).unwrap();

        let out = output_arg(&invocation);
        assert!(out.starts_with("/tmp/media"), "got {out}");
        assert_eq!(remaining, strings(&["--no-playlist"]));
        assert_eq!(invocation.argv.last().unwrap(), "https://x/y");
    }

    #[test]
    fn test_download_flag_is_not_directory_override() {
        let config = DownloadConfig::default();
        let args = strings(&["https://x/y", "--no-playlist"]);
        let (invocation, remaining) = build_download(DownloadMode::Video, &config, &args).unwrap();

        let out = output_arg(&invocation);
        assert!(out.contains("Videos"), "got {out}");
        assert_eq!(remaining, strings(&["--no-playlist"]));
    }

    #[test]
    fn test_download_drops_empty_tokens() {
        let config = DownloadConfig::default();
        let args = strings(&["https://x/y", "--no-playlist", ""]);
        let (invocation, _) = build_download(DownloadMode::Audio, &config, &args).unwrap();
        assert!(invocation.argv.iter().all(|t| !t.is_empty()));
        assert_eq!(invocation.argv.last().unwrap(), "https://x/y");
    }

    #[test]
    fn test_download_progress_template_present() {
        let config = DownloadConfig::default();
        let args = strings(&["https://x/y"]);
        let (invocation, _) = build_download(DownloadMode::Audio, &config, &args).unwrap();
        let i = invocation
            .argv
            .iter()
            .position(|t| t == "--progress-template")
            .unwrap();
        assert_eq!(
            invocation.argv[i + 1],
            "%(progress.downloaded_bytes)s %(progress.total_bytes)s"
        );
    }

    fn output_arg(invocation: &Invocation) -> String {
        let i = invocation.argv.iter().position(|t| t == "-o").unwrap();
        invocation.argv[i + 1].clone()
    }
}
