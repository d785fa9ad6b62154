//! End-to-end orchestrator tests driving real subprocesses through fake
//! ffmpeg/ffprobe shell scripts.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::Receiver;
use tempfile::TempDir;

use batch_converter::converter::{
    ConvertError, ConverterEvent, EncodingOptions, FfmpegTools, JobOutcome, Orchestrator,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fake ffprobe: reports 100s for everything except inputs named *noprobe*.
const FAKE_FFPROBE: &str = r#"
for arg; do last="$arg"; done
case "$last" in
  *noprobe*) echo "no such stream" >&2; exit 1;;
esac
echo 100.000000
"#;

/// Fake ffmpeg: fails for *fail* inputs, hangs for *slow* inputs, otherwise
/// reports 50% progress on stderr and exits cleanly.
const FAKE_FFMPEG: &str = r#"
case "$*" in
  *fail*) exit 1;;
  *slow*) exec sleep 30;;
esac
printf 'frame=1500\ntime=00:00:50.00\nspeed=2x\n' >&2
exit 0
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn fake_tools(dir: &TempDir) -> FfmpegTools {
    let ffmpeg = write_script(dir.path(), "ffmpeg", FAKE_FFMPEG);
    let ffprobe = write_script(dir.path(), "ffprobe", FAKE_FFPROBE);
    FfmpegTools::new(ffmpeg, ffprobe)
}

/// Drain events until a `BatchComplete` arrives.
fn collect_batch(events: &Receiver<ConverterEvent>) -> Vec<ConverterEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(EVENT_TIMEOUT)
            .expect("batch did not complete in time");
        let done = matches!(event, ConverterEvent::BatchComplete);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn completion_of<'a>(events: &'a [ConverterEvent], file: &Path) -> &'a JobOutcome {
    events
        .iter()
        .find_map(|event| match event {
            ConverterEvent::Completed { file: f, outcome } if f == file => Some(outcome),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no completion for {}", file.display()))
}

#[test]
fn two_file_batch_reports_progress_completions_then_batch_complete() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, events) = Orchestrator::with_tools(fake_tools(&dir));

    let good = dir.path().join("good.mp4");
    let bad = dir.path().join("will-fail.mp4");
    orchestrator.start_batch(vec![good.clone(), bad.clone()], EncodingOptions::default());

    let seen = collect_batch(&events);

    // Duration 100s, elapsed 50s: one 50% progress event for the good file.
    assert!(seen
        .iter()
        .any(|e| *e == ConverterEvent::Progress { file: good.clone(), percent: 50 }));
    assert_eq!(completion_of(&seen, &good), &JobOutcome::Succeeded);
    assert_eq!(
        completion_of(&seen, &bad),
        &JobOutcome::Failed(ConvertError::Encode { code: Some(1) })
    );

    // Exactly one completion per file, batch-complete strictly last.
    let completions = seen
        .iter()
        .filter(|e| matches!(e, ConverterEvent::Completed { .. }))
        .count();
    assert_eq!(completions, 2);
    assert_eq!(seen.last(), Some(&ConverterEvent::BatchComplete));

    // Progress for a file never follows its completion.
    let progress_pos = seen
        .iter()
        .position(|e| matches!(e, ConverterEvent::Progress { file, .. } if *file == good))
        .unwrap();
    let completion_pos = seen
        .iter()
        .position(|e| matches!(e, ConverterEvent::Completed { file, .. } if *file == good))
        .unwrap();
    assert!(progress_pos < completion_pos);

    // Nothing fires after batch-complete.
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn probe_failure_fails_only_that_file() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, events) = Orchestrator::with_tools(fake_tools(&dir));

    let unprobed = dir.path().join("noprobe.mp4");
    let good = dir.path().join("good.mp4");
    orchestrator.start_batch(
        vec![unprobed.clone(), good.clone()],
        EncodingOptions::default(),
    );

    let seen = collect_batch(&events);

    assert!(matches!(
        completion_of(&seen, &unprobed),
        JobOutcome::Failed(ConvertError::Probe(_))
    ));
    assert_eq!(completion_of(&seen, &good), &JobOutcome::Succeeded);
    // No progress for the file that never spawned an encoder.
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ConverterEvent::Progress { file, .. } if *file == unprobed)));
}

#[test]
fn spawn_failure_fails_only_that_file() {
    let dir = TempDir::new().unwrap();
    let ffprobe = write_script(dir.path(), "ffprobe", FAKE_FFPROBE);
    let tools = FfmpegTools::new(dir.path().join("missing-ffmpeg"), ffprobe);
    let (orchestrator, events) = Orchestrator::with_tools(tools);

    let input = dir.path().join("good.mp4");
    orchestrator.start_batch(vec![input.clone()], EncodingOptions::default());

    let seen = collect_batch(&events);
    assert!(matches!(
        completion_of(&seen, &input),
        JobOutcome::Failed(ConvertError::Spawn(_))
    ));
    assert_eq!(seen.last(), Some(&ConverterEvent::BatchComplete));
}

#[test]
fn cancellation_is_isolated_to_one_file() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, events) = Orchestrator::with_tools(fake_tools(&dir));

    let slow = dir.path().join("slow.mp4");
    let b = dir.path().join("b.mp4");
    let c = dir.path().join("c.mp4");
    orchestrator.start_batch(
        vec![slow.clone(), b.clone(), c.clone()],
        EncodingOptions::default(),
    );

    // Let the slow encoder get going, then cancel it.
    std::thread::sleep(Duration::from_millis(500));
    orchestrator.cancel(&slow);

    let seen = collect_batch(&events);

    assert_eq!(completion_of(&seen, &slow), &JobOutcome::Cancelled);
    assert_eq!(completion_of(&seen, &b), &JobOutcome::Succeeded);
    assert_eq!(completion_of(&seen, &c), &JobOutcome::Succeeded);
    assert_eq!(seen.last(), Some(&ConverterEvent::BatchComplete));
}

#[test]
fn duplicate_start_for_active_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, events) = Orchestrator::with_tools(fake_tools(&dir));

    let slow = dir.path().join("slow.mp4");
    orchestrator.start_batch(vec![slow.clone()], EncodingOptions::default());

    // Give the first worker time to register and spawn.
    std::thread::sleep(Duration::from_millis(500));
    orchestrator.start_batch(vec![slow.clone()], EncodingOptions::default());

    // The second batch completes right away with a rejection.
    let mut rejected = false;
    let mut batch_completes = 0;
    while batch_completes < 1 {
        match events.recv_timeout(EVENT_TIMEOUT).unwrap() {
            ConverterEvent::Completed {
                outcome: JobOutcome::Failed(ConvertError::AlreadyActive),
                ..
            } => rejected = true,
            ConverterEvent::BatchComplete => batch_completes += 1,
            _ => {}
        }
    }
    assert!(rejected);

    // The original job is still cancellable: it was never orphaned.
    orchestrator.cancel(&slow);
    let mut cancelled = false;
    while batch_completes < 2 {
        match events.recv_timeout(EVENT_TIMEOUT).unwrap() {
            ConverterEvent::Completed {
                outcome: JobOutcome::Cancelled,
                file,
            } => cancelled = cancelled || file == slow,
            ConverterEvent::BatchComplete => batch_completes += 1,
            _ => {}
        }
    }
    assert!(cancelled);
}

#[test]
fn batch_complete_fires_once_for_larger_batches() {
    let dir = TempDir::new().unwrap();
    let (orchestrator, events) = Orchestrator::with_tools(fake_tools(&dir));

    let inputs: Vec<PathBuf> = (0..5)
        .map(|i| dir.path().join(format!("clip{i}.mp4")))
        .collect();
    orchestrator.start_batch(inputs.clone(), EncodingOptions::default());

    let seen = collect_batch(&events);

    for input in &inputs {
        assert_eq!(completion_of(&seen, input), &JobOutcome::Succeeded);
    }
    let completions = seen
        .iter()
        .filter(|e| matches!(e, ConverterEvent::Completed { .. }))
        .count();
    assert_eq!(completions, inputs.len());
    assert_eq!(seen.last(), Some(&ConverterEvent::BatchComplete));
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
}
