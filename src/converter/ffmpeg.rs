//! FFmpeg and FFprobe invocation: tool discovery, duration probing and
//! encoder argument assembly.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use thiserror::Error;

use super::options::{EncodingOptions, Resolution, VideoBitrate};

/// Errors locating the external tools.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("FFmpeg binary not found. Please install FFmpeg or place it in assets/ffmpeg/")]
    FfmpegNotFound,
    #[error("FFprobe binary not found. Please install FFmpeg or place it in assets/ffmpeg/")]
    FfprobeNotFound,
}

/// Errors from the duration probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[from] io::Error),
    #[error("ffprobe exited with code {code:?}: {stderr}")]
    Tool { code: Option<i32>, stderr: String },
    #[error("unparsable ffprobe output: {0:?}")]
    BadOutput(String),
}

/// Resolved paths to the FFmpeg and FFprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTools {
    /// Use explicit tool paths. Callers shipping their own binaries and
    /// tests substituting fakes go through here.
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Locate both binaries: bundled assets directory, then system PATH,
    /// then common install locations.
    pub fn discover() -> Result<Self, ToolError> {
        let ffmpeg = find_tool("ffmpeg").ok_or(ToolError::FfmpegNotFound)?;
        let ffprobe = find_tool("ffprobe").ok_or(ToolError::FfprobeNotFound)?;
        log::debug!(
            "using ffmpeg at {}, ffprobe at {}",
            ffmpeg.display(),
            ffprobe.display()
        );

        Ok(Self { ffmpeg, ffprobe })
    }

    /// Probe the total duration of `input` in seconds.
    ///
    /// Runs FFprobe once and parses the single floating-point number it
    /// prints on stdout. Every job is probed before its encoder starts,
    /// since the percentage computation needs a denominator.
    pub fn probe_duration(&self, input: &Path) -> Result<f64, ProbeError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .output()?;

        if !output.status.success() {
            return Err(ProbeError::Tool {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse::<f64>()
            .map_err(|_| ProbeError::BadOutput(stdout.trim().to_string()))
    }

    /// Spawn the encoder with stderr piped for the progress stream.
    pub(crate) fn spawn_encoder(&self, args: &[String]) -> io::Result<Child> {
        Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
    }
}

/// Find a tool binary in various locations.
fn find_tool(name: &str) -> Option<PathBuf> {
    let exe = if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    };

    // 1. Bundled location
    let bundled = Path::new("assets/ffmpeg").join(&exe);
    if bundled.exists() {
        return Some(bundled);
    }

    // 2. System PATH
    if let Ok(path) = which::which(name) {
        return Some(path);
    }

    // 3. Common install locations
    let prefixes: &[&str] = if cfg!(target_os = "macos") {
        &["/usr/local/bin", "/opt/homebrew/bin", "/opt/local/bin"]
    } else if cfg!(target_os = "windows") {
        &["C:\\ffmpeg\\bin", "C:\\Program Files\\ffmpeg\\bin"]
    } else {
        &["/usr/bin", "/usr/local/bin"]
    };

    prefixes
        .iter()
        .map(|prefix| Path::new(prefix).join(&exe))
        .find(|path| path.exists())
}

/// Assemble the encoder argument list for one file.
///
/// Pure transformation of the options record; no filesystem or process
/// interaction. The quality arguments are mutually exclusive: `Auto`
/// bitrate selects `-crf`, an explicit bitrate selects `-b:v`. Filters are
/// emitted only when they change something, and the output path is always
/// the final positional argument.
pub fn build_encoder_args(input: &Path, options: &EncodingOptions, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(), // Overwrite output files without asking
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-c:v".to_string(),
        options.video_codec.clone(),
        "-preset".to_string(),
        "medium".to_string(),
        "-c:a".to_string(),
        options.audio_codec.clone(),
        "-b:a".to_string(),
        options.audio_bitrate.clone(),
        "-progress".to_string(),
        "pipe:2".to_string(), // Machine-parsable progress on stderr
    ];

    match &options.video_bitrate {
        VideoBitrate::Auto => {
            args.push("-crf".to_string());
            args.push(options.quality.to_string());
        }
        VideoBitrate::Rate(rate) => {
            args.push("-b:v".to_string());
            args.push(rate.clone());
        }
    }

    if options.volume_db != 0.0 {
        args.push("-af".to_string());
        args.push(format!("volume={}dB", options.volume_db));
    }

    if let Resolution::Custom(size) = &options.resolution {
        args.push("-vf".to_string());
        args.push(format!("scale={size}"));
    }

    args.push(output.to_string_lossy().into_owned());
    args
}
