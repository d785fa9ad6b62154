//! Batch Video Conversion
//!
//! Drives one FFmpeg process per input file, with live progress parsed from
//! the encoder's progress stream, per-file cancellation and a batch-complete
//! signal once every job has reached a terminal state.

mod ffmpeg;
mod job;
mod options;
mod orchestrator;
mod progress;

pub use ffmpeg::{build_encoder_args, FfmpegTools, ProbeError, ToolError};
pub use job::{ConvertError, JobOutcome};
pub use options::{EncodingOptions, Resolution, VideoBitrate};
pub use orchestrator::{ConverterEvent, Orchestrator};
pub use progress::parse_progress;
