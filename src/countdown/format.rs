//! Human-readable countdown text.

use crate::timing::{TimeSpec, TimeUnit};

/// `H:MM:SS` for an hour or more, `M:SS` below. Absent, negative or
/// non-finite input renders as `0:00`.
#[must_use]
pub fn format_remaining(secs: Option<f64>) -> String {
    let total = match secs {
        Some(s) if s.is_finite() && s > 0.0 => s.ceil() as u64,
        _ => 0,
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Progress as a whole percentage string, e.g. `"42%"`.
#[must_use]
pub fn format_progress(progress: f64) -> String {
    let pct = if progress.is_finite() {
        progress.clamp(0.0, 100.0)
    } else {
        0.0
    };
    format!("{pct:.0}%")
}

/// `30 minutes`, `1 hour`, `at 06:30`.
#[must_use]
pub fn describe_timing(timing: &TimeSpec) -> String {
    match *timing {
        TimeSpec::Relative { delay, unit } => {
            let noun = match unit {
                TimeUnit::Seconds => "second",
                TimeUnit::Minutes => "minute",
                TimeUnit::Hours => "hour",
            };
            if delay == 1 {
                format!("1 {noun}")
            } else {
                format!("{delay} {noun}s")
            }
        }
        TimeSpec::Absolute { at_time } => format!("at {at_time}"),
    }
}
