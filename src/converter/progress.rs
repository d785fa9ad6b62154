//! Parsing of FFmpeg's progress stream.

use once_cell::sync::Lazy;
use regex::Regex;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})\.(\d{2})").unwrap());

/// Extract the elapsed encode time in seconds from one chunk of progress
/// output.
///
/// With `-progress pipe:2` FFmpeg writes repeated `key=value` lines on
/// stderr, among them `time=HH:MM:SS.CC`. A chunk may carry partial or
/// multiple progress blocks; when no timestamp is present there is simply
/// nothing to report, which is not an error.
pub fn parse_progress(chunk: &str) -> Option<f64> {
    let caps = TIME_RE.captures(chunk)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let centis: f64 = caps[4].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds + centis / 100.0)
}
