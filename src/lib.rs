//! Batch Converter Library
//!
//! Converts batches of video files by driving FFmpeg subprocesses, one per
//! file, and reports progress and completion as events.

pub mod converter;

// Re-export commonly used types
pub use converter::{ConverterEvent, EncodingOptions, JobOutcome, Orchestrator};
