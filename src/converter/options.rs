//! Encoding options shared by every job in a batch.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target resolution for the scale filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Resolution {
    /// Keep the source resolution (no scale filter).
    #[default]
    Original,
    /// Scale to an explicit `WIDTHxHEIGHT` size.
    Custom(String),
}

impl FromStr for Resolution {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("original") {
            Ok(Resolution::Original)
        } else {
            Ok(Resolution::Custom(s.to_string()))
        }
    }
}

/// Video bitrate selector. `Auto` switches the encoder to constant-quality
/// (CRF) mode; an explicit rate switches it to bitrate mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VideoBitrate {
    #[default]
    Auto,
    Rate(String),
}

impl FromStr for VideoBitrate {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(VideoBitrate::Auto)
        } else {
            Ok(VideoBitrate::Rate(s.to_string()))
        }
    }
}

/// Options applied to every file of a batch, supplied once at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingOptions {
    pub resolution: Resolution,
    pub video_codec: String,
    /// Output container format, also the output file extension.
    pub output_format: String,
    /// CRF quality factor, used only when `video_bitrate` is `Auto`.
    pub quality: u32,
    pub video_bitrate: VideoBitrate,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Volume adjustment in decibels; zero means unchanged.
    pub volume_db: f64,
    /// Destination directory; `None` places outputs next to their inputs.
    pub output_dir: Option<PathBuf>,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::Original,
            video_codec: "libx264".to_string(),
            output_format: "mp4".to_string(),
            quality: 23,
            video_bitrate: VideoBitrate::Auto,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            volume_db: 0.0,
            output_dir: None,
        }
    }
}

impl EncodingOptions {
    /// Resolved output path for one input: `converted_<stem>.<format>` in
    /// the output directory, or next to the input when none is set.
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let file_name = format!("converted_{}.{}", stem, self.output_format);

        match &self.output_dir {
            Some(dir) => dir.join(file_name),
            None => input.with_file_name(file_name),
        }
    }
}
