//! Countdown tracking: per-surface state, tick timers and display text.

pub mod format;
pub mod ticker;
pub mod tracker;

pub use format::{describe_timing, format_progress, format_remaining};
pub use ticker::{
    ChannelIntervalSpawner, IntervalHandle, IntervalSpawner, ManualIntervalSpawner, PanelTick,
};
pub use tracker::{CountdownView, SurfaceState, SurfaceTracker};
