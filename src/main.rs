//! Batch Converter - FFmpeg batch conversion from the command line.
//!
//! Main entry point: parses the batch request, starts the orchestrator and
//! renders its event stream.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use batch_converter::converter::{
    ConverterEvent, EncodingOptions, JobOutcome, Orchestrator, Resolution, VideoBitrate,
};

#[derive(Parser)]
#[command(
    name = "batch-converter",
    version,
    about = "Convert a batch of video files with FFmpeg"
)]
struct Cli {
    /// Input video files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Target resolution: "original" or WIDTHxHEIGHT (e.g. 1280x720)
    #[arg(long, default_value = "original")]
    resolution: Resolution,

    /// Video codec
    #[arg(long, default_value = "libx264")]
    video_codec: String,

    /// Output directory (default: next to each input file)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Volume adjustment in dB (0 = unchanged)
    #[arg(long, default_value_t = 0.0)]
    volume: f64,

    /// Output container format
    #[arg(long, default_value = "mp4")]
    format: String,

    /// CRF quality factor, used when --video-bitrate is "auto"
    #[arg(long, default_value_t = 23)]
    quality: u32,

    /// Video bitrate, or "auto" for constant-quality encoding
    #[arg(long, default_value = "auto")]
    video_bitrate: VideoBitrate,

    /// Audio codec
    #[arg(long, default_value = "aac")]
    audio_codec: String,

    /// Audio bitrate
    #[arg(long, default_value = "192k")]
    audio_bitrate: String,

    /// Print events as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn encoding_options(&self) -> EncodingOptions {
        EncodingOptions {
            resolution: self.resolution.clone(),
            video_codec: self.video_codec.clone(),
            output_format: self.format.clone(),
            quality: self.quality,
            video_bitrate: self.video_bitrate.clone(),
            audio_codec: self.audio_codec.clone(),
            audio_bitrate: self.audio_bitrate.clone(),
            volume_db: self.volume,
            output_dir: self.output_dir.clone(),
        }
    }
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    log::info!("Starting Batch Converter v{}", env!("CARGO_PKG_VERSION"));

    let options = cli.encoding_options();
    let total = cli.inputs.len();
    let (orchestrator, events) = Orchestrator::new()?;
    orchestrator.start_batch(cli.inputs, options);

    let mut failures = 0usize;
    for event in events.iter() {
        if let ConverterEvent::Completed {
            outcome: JobOutcome::Failed(_),
            ..
        } = &event
        {
            failures += 1;
        }

        if cli.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            match &event {
                ConverterEvent::Progress { file, percent } => {
                    log::info!("{}: {percent}%", file.display());
                }
                ConverterEvent::Completed { file, outcome } => match outcome {
                    JobOutcome::Succeeded => log::info!("{}: done", file.display()),
                    JobOutcome::Cancelled => log::warn!("{}: cancelled", file.display()),
                    JobOutcome::Failed(err) => log::error!("{}: {err}", file.display()),
                },
                ConverterEvent::BatchComplete => {
                    log::info!("all {total} conversions complete, {failures} failed");
                }
            }
        }

        if matches!(event, ConverterEvent::BatchComplete) {
            break;
        }
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
