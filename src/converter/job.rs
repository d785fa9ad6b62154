//! Per-file conversion job state.

use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

/// Why a job ended in `Failed`.
///
/// Carries owned strings rather than source errors so completion events can
/// cross the UI boundary by value.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ConvertError {
    #[error("failed to get video duration: {0}")]
    Probe(String),
    #[error("failed to start encoder: {0}")]
    Spawn(String),
    #[error("encoder exited with code {code:?}")]
    Encode { code: Option<i32> },
    #[error("a conversion for this file is already running")]
    AlreadyActive,
}

/// Terminal state of a job. Exactly one of these is reported per file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JobOutcome {
    Succeeded,
    Failed(ConvertError),
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// Shared handle for one active job.
///
/// The worker thread owns the job's lifecycle end to end; the orchestrator
/// keeps the handle in its registry only to reach the process for
/// cancellation. The process handle is present solely between spawn and
/// exit.
pub(crate) struct Job {
    child: Mutex<Option<Child>>,
    cancel_requested: AtomicBool,
    /// Last published percentage, so progress never goes backwards.
    last_percent: AtomicU8,
}

impl Job {
    pub fn new() -> Self {
        Self {
            child: Mutex::new(None),
            cancel_requested: AtomicBool::new(false),
            last_percent: AtomicU8::new(0),
        }
    }

    /// Hand the spawned encoder process to the job. If a cancel request
    /// arrived before the process existed, honor it now.
    pub fn attach_child(&self, child: Child) {
        *self.child.lock().unwrap() = Some(child);
        if self.cancel_requested() {
            self.kill_child();
        }
    }

    /// Take the process back for reaping. After this, cancellation is a
    /// no-op; the process is already on its way out.
    pub fn detach_child(&self) -> Option<Child> {
        self.child.lock().unwrap().take()
    }

    /// Request termination of the encoder process, if one is running.
    /// Cooperative: the worker's exit path performs the terminal
    /// transition.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.kill_child();
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Record a progress reading; returns false when it would move the
    /// published percentage backwards.
    pub fn advance_percent(&self, percent: u8) -> bool {
        let previous = self.last_percent.fetch_max(percent, Ordering::SeqCst);
        percent >= previous
    }

    fn kill_child(&self) {
        if let Some(child) = self.child.lock().unwrap().as_mut() {
            let _ = child.kill();
        }
    }
}

/// Classify an encoder exit status into the job's terminal outcome.
///
/// A process brought down after a cancel request is reported `Cancelled`,
/// any other non-zero exit is `Failed`. A kill that raced with a clean exit
/// still counts as success.
pub(crate) fn classify_exit(status: ExitStatus, cancel_requested: bool) -> JobOutcome {
    if status.success() {
        JobOutcome::Succeeded
    } else if cancel_requested {
        JobOutcome::Cancelled
    } else {
        JobOutcome::Failed(ConvertError::Encode {
            code: status.code(),
        })
    }
}
