//! Batch orchestration: one encoder process per file, with progress and
//! completion fanned in over a single event channel.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

use super::ffmpeg::{build_encoder_args, FfmpegTools, ToolError};
use super::job::{classify_exit, ConvertError, Job, JobOutcome};
use super::options::EncodingOptions;
use super::progress::parse_progress;

/// Events delivered to the UI/CLI layer.
///
/// For a single file, `Progress` percentages are non-decreasing and all
/// precede that file's single `Completed`; `BatchComplete` arrives exactly
/// once per batch, strictly after every file's `Completed`. Across files no
/// relative ordering is guaranteed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ConverterEvent {
    /// Normalized progress for one file, 0-100.
    Progress { file: PathBuf, percent: u8 },
    /// One file reached its terminal state.
    Completed { file: PathBuf, outcome: JobOutcome },
    /// Every file of the batch has completed.
    BatchComplete,
}

/// Terminal-completion counter for one batch.
struct BatchState {
    total: usize,
    terminal: AtomicUsize,
}

/// Drives a batch of conversions, one encoder process per input file.
///
/// All jobs of a batch run concurrently; the orchestrator tracks them in a
/// registry keyed by input path so any of them can be cancelled without
/// disturbing the others. No method blocks on encoder work: `start_batch`
/// returns once the workers are launched and everything else arrives on the
/// event channel handed out at construction.
#[derive(Clone)]
pub struct Orchestrator {
    tools: Arc<FfmpegTools>,
    active: Arc<Mutex<HashMap<PathBuf, Arc<Job>>>>,
    event_tx: Sender<ConverterEvent>,
}

impl Orchestrator {
    /// Create an orchestrator with auto-discovered FFmpeg binaries.
    pub fn new() -> Result<(Self, Receiver<ConverterEvent>), ToolError> {
        Ok(Self::with_tools(FfmpegTools::discover()?))
    }

    /// Create an orchestrator around explicit tool paths.
    pub fn with_tools(tools: FfmpegTools) -> (Self, Receiver<ConverterEvent>) {
        let (event_tx, event_rx) = unbounded();
        let orchestrator = Self {
            tools: Arc::new(tools),
            active: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
        };
        (orchestrator, event_rx)
    }

    /// Start converting a batch of files with shared options.
    ///
    /// Returns as soon as the per-file workers are launched. A file whose
    /// duration probe or spawn fails gets a `Failed` completion without
    /// affecting its siblings; a file that already has an active conversion
    /// is rejected the same way rather than orphaning the running process.
    pub fn start_batch(&self, inputs: Vec<PathBuf>, options: EncodingOptions) {
        let batch = Arc::new(BatchState {
            total: inputs.len(),
            terminal: AtomicUsize::new(0),
        });
        if batch.total == 0 {
            let _ = self.event_tx.send(ConverterEvent::BatchComplete);
            return;
        }

        let options = Arc::new(options);
        for input in inputs {
            // Reserve the registry slot before any work happens, so a
            // concurrent start for the same path cannot slip in between
            // probe and spawn.
            let job = Arc::new(Job::new());
            {
                let mut active = self.active.lock().unwrap();
                if active.contains_key(&input) {
                    drop(active);
                    log::warn!(
                        "{}: conversion already in progress, rejecting",
                        input.display()
                    );
                    self.finish(
                        input,
                        JobOutcome::Failed(ConvertError::AlreadyActive),
                        &batch,
                    );
                    continue;
                }
                active.insert(input.clone(), Arc::clone(&job));
            }

            let orchestrator = self.clone();
            let options = Arc::clone(&options);
            let batch = Arc::clone(&batch);
            thread::spawn(move || {
                let outcome = orchestrator.convert(&input, &options, &job);
                // Sole removal point for this entry; the worker reaches it
                // on every exit path.
                orchestrator.active.lock().unwrap().remove(&input);
                orchestrator.finish(input, outcome, &batch);
            });
        }
    }

    /// Request cancellation of the running conversion for `input`.
    ///
    /// Best effort: the process is asked to die, and the job stays
    /// registered until its worker observes the exit. No-op when the path
    /// has no active job.
    pub fn cancel(&self, input: &Path) {
        let job = self.active.lock().unwrap().get(input).cloned();
        match job {
            Some(job) => {
                log::info!("{}: cancelling conversion", input.display());
                job.request_cancel();
            }
            None => log::debug!("{}: no active conversion to cancel", input.display()),
        }
    }

    /// Run one file's conversion to its terminal outcome.
    fn convert(&self, input: &Path, options: &EncodingOptions, job: &Job) -> JobOutcome {
        let duration = match self.tools.probe_duration(input) {
            Ok(seconds) => seconds,
            Err(err) => return JobOutcome::Failed(ConvertError::Probe(err.to_string())),
        };
        if job.cancel_requested() {
            // Cancelled while probing; nothing was spawned.
            return JobOutcome::Cancelled;
        }

        let output = options.output_path_for(input);
        let args = build_encoder_args(input, options, &output);
        log::info!(
            "{}: converting to {} ({}s)",
            input.display(),
            output.display(),
            duration
        );
        log::debug!("{}: ffmpeg {}", input.display(), args.join(" "));

        let mut child = match self.tools.spawn_encoder(&args) {
            Ok(child) => child,
            Err(err) => return JobOutcome::Failed(ConvertError::Spawn(err.to_string())),
        };
        let stderr = child.stderr.take();
        job.attach_child(child);

        if let Some(mut stderr) = stderr {
            let mut buf = [0u8; 4096];
            loop {
                match stderr.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]);
                        if let Some(elapsed) = parse_progress(&chunk) {
                            self.publish_progress(input, job, elapsed, duration);
                        }
                    }
                }
            }
        }

        // The progress stream is closed; reap the process and classify.
        let Some(mut child) = job.detach_child() else {
            return JobOutcome::Failed(ConvertError::Spawn(
                "encoder process handle lost".to_string(),
            ));
        };
        match child.wait() {
            Ok(status) => classify_exit(status, job.cancel_requested()),
            Err(err) => {
                log::error!("{}: failed to reap encoder: {err}", input.display());
                JobOutcome::Failed(ConvertError::Encode { code: None })
            }
        }
    }

    /// Emit a progress event when a parsed timestamp advances the job.
    /// An unknown or zero duration suppresses progress entirely.
    fn publish_progress(&self, input: &Path, job: &Job, elapsed: f64, duration: f64) {
        if duration <= 0.0 {
            return;
        }
        let percent = (elapsed / duration * 100.0).round().clamp(0.0, 100.0) as u8;
        if job.advance_percent(percent) {
            let _ = self.event_tx.send(ConverterEvent::Progress {
                file: input.to_path_buf(),
                percent,
            });
        }
    }

    /// Publish a job's single terminal event and, when it is the batch's
    /// last, the batch-complete signal.
    fn finish(&self, input: PathBuf, outcome: JobOutcome, batch: &BatchState) {
        match &outcome {
            JobOutcome::Succeeded => log::info!("{}: conversion finished", input.display()),
            JobOutcome::Cancelled => log::info!("{}: conversion cancelled", input.display()),
            JobOutcome::Failed(err) => log::error!("{}: {err}", input.display()),
        }
        let _ = self
            .event_tx
            .send(ConverterEvent::Completed { file: input, outcome });

        // fetch_add hands every job a distinct count, so exactly one of
        // them observes the batch total.
        let done = batch.terminal.fetch_add(1, Ordering::SeqCst) + 1;
        if done == batch.total {
            let _ = self.event_tx.send(ConverterEvent::BatchComplete);
        }
    }
}
