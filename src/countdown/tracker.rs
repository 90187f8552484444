//! Per-surface countdown state machine.

use crate::resolver::{self, SurfaceIdentity};
use crate::snapshot::MonitorSnapshot;

/// Where a surface is in its schedule lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SurfaceState {
    /// No task; controls visible.
    #[default]
    Idle,
    /// A task is counting down.
    Scheduled,
    /// The countdown reached zero but the backend has not removed the task.
    Expiring,
}

impl SurfaceState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Expiring => "expiring",
        }
    }
}

/// What a surface should render after a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountdownView {
    pub state: SurfaceState,
    /// Snapshot key the task was matched under.
    pub task_key: Option<String>,
    pub label: Option<String>,
    /// Never negative.
    pub remaining_secs: f64,
    /// Elapsed share of the window, `0..=100`.
    pub progress: f64,
}

impl CountdownView {
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.state == SurfaceState::Scheduled
    }

    /// Schedule controls are shown whenever no countdown is running.
    #[must_use]
    pub fn controls_visible(&self) -> bool {
        !self.is_scheduled()
    }
}

/// Captured window of one task instance.
#[derive(Debug, Clone, PartialEq)]
struct Window {
    key: String,
    /// End as published; a new end means a new schedule under the same key.
    published_end: Option<f64>,
    start: f64,
    end: f64,
}

/// Tracks one surface across ticks.
///
/// The start of the progress window is captured once per task instance:
/// repeated ticks against the same key and end never move it.
#[derive(Debug, Clone, Default)]
pub struct SurfaceTracker {
    state: SurfaceState,
    window: Option<Window>,
}

impl SurfaceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    /// Recompute against `snapshot` at `now` (epoch seconds).
    pub fn tick(&mut self, identity: &SurfaceIdentity, snapshot: &MonitorSnapshot, now: f64) -> CountdownView {
        let Some(found) = resolver::resolve_task(identity, snapshot) else {
            if self.state != SurfaceState::Idle {
                tracing::debug!("countdown idle: task no longer in snapshot");
            }
            self.state = SurfaceState::Idle;
            self.window = None;
            return CountdownView::default();
        };

        let task = found.task;
        let same_instance = self.window.as_ref().is_some_and(|w| {
            w.key == found.key && w.published_end == task.end_timestamp && self.state != SurfaceState::Idle
        });
        if !same_instance {
            let start = task.start_timestamp.unwrap_or(now);
            let end = task
                .end_timestamp
                .or_else(|| task.remaining_seconds.map(|r| now + r.max(0.0)))
                .unwrap_or(start);
            tracing::debug!(key = found.key, start, end, "countdown captured window");
            self.window = Some(Window {
                key: found.key.to_owned(),
                published_end: task.end_timestamp,
                start,
                end,
            });
        }
        let Some(window) = self.window.as_ref() else {
            return CountdownView::default();
        };

        let remaining_secs = remaining(window.end, now);
        self.state = if remaining_secs > 0.0 {
            SurfaceState::Scheduled
        } else {
            SurfaceState::Expiring
        };
        let progress = if self.state == SurfaceState::Scheduled {
            progress(window.start, window.end, now)
        } else {
            0.0
        };

        CountdownView {
            state: self.state,
            task_key: Some(window.key.clone()),
            label: task.label.clone(),
            remaining_secs,
            progress,
        }
    }
}

/// Seconds left until `end`, floored at zero.
#[must_use]
pub fn remaining(end: f64, now: f64) -> f64 {
    let left = end - now;
    if left.is_finite() && left > 0.0 { left } else { 0.0 }
}

/// Elapsed share of `start..end` at `now`, as a percentage in `0..=100`.
///
/// A zero-length or inverted window yields 0.
#[must_use]
pub fn progress(start: f64, end: f64, now: f64) -> f64 {
    let total = end - start;
    if !total.is_finite() || total <= 0.0 {
        return 0.0;
    }
    let fraction = (now - start) / total;
    if fraction.is_finite() {
        fraction.clamp(0.0, 1.0) * 100.0
    } else {
        0.0
    }
}
