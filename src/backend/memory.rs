//! In-process scheduling backend.
//!
//! Holds tasks and preferences in memory and publishes the monitor snapshot
//! after every change. Finish actions are never executed here; due tasks are
//! removed by `expire_due`, which the command server calls once per tick.

use crate::client::channel::SchedulerBackend;
use crate::client::scheduling::ScheduleRequest;
use crate::error::{Result, TimerError};
use crate::preferences::{HISTORY_LIMIT, Preferences, push_history};
use crate::snapshot::{
    MonitorSnapshot, Preset, SnapshotFeed, SnapshotPublisher, TaskSnapshot, default_presets,
    snapshot_channel,
};
use crate::timing::TimeSpec;
use chrono::{DateTime, FixedOffset, Local};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Source of "now" in the backend's local zone.
pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

#[derive(Debug, Default)]
struct MemoryState {
    tasks: BTreeMap<String, TaskSnapshot>,
    preferences: BTreeMap<String, Preferences>,
    presets: Vec<Preset>,
}

#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    publisher: SnapshotPublisher,
    clock: Clock,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn epoch_secs(instant: &DateTime<FixedOffset>) -> f64 {
    instant.timestamp_millis() as f64 / 1000.0
}

impl MemoryBackend {
    /// Backend on the system local clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| Local::now().fixed_offset()))
    }

    /// Backend on an injected clock.
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        let state = MemoryState {
            presets: default_presets(),
            ..MemoryState::default()
        };
        let (publisher, _feed) = snapshot_channel(MonitorSnapshot {
            presets: state.presets.clone(),
            ..MonitorSnapshot::default()
        });
        Self {
            state: Arc::new(Mutex::new(state)),
            publisher,
            clock,
        }
    }

    /// A reader of every snapshot this backend publishes.
    #[must_use]
    pub fn subscribe(&self) -> SnapshotFeed {
        self.publisher.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<FixedOffset> {
        (self.clock)()
    }

    fn build_snapshot(state: &MemoryState, now: f64) -> MonitorSnapshot {
        let tasks = state
            .tasks
            .iter()
            .map(|(key, task)| {
                let mut task = task.clone();
                task.remaining_seconds = task.end_timestamp.map(|end| (end - now).max(0.0));
                (key.clone(), task)
            })
            .collect();
        MonitorSnapshot {
            tasks,
            preferences: state.preferences.clone(),
            presets: state.presets.clone(),
        }
    }

    fn publish(&self, state: &MemoryState) {
        let now = epoch_secs(&self.now());
        self.publisher.publish(Self::build_snapshot(state, now));
    }
}

impl SchedulerBackend for MemoryBackend {
    fn expire_due(&self) -> Result<Vec<TaskSnapshot>> {
        let now = epoch_secs(&self.now());
        let mut state = self.lock();
        let due: Vec<String> = state
            .tasks
            .iter()
            .filter(|(_, task)| task.end_timestamp.is_some_and(|end| end <= now))
            .map(|(key, _)| key.clone())
            .collect();
        if due.is_empty() {
            return Ok(Vec::new());
        }
        let expired: Vec<TaskSnapshot> = due
            .iter()
            .filter_map(|key| state.tasks.remove(key))
            .collect();
        for task in &expired {
            info!(task_id = %task.id, "task completed");
        }
        self.publish(&state);
        Ok(expired)
    }

    fn schedule(&self, request: ScheduleRequest) -> Result<TaskSnapshot> {
        request.validate()?;
        let now = self.now();
        let duration = request.timing.duration_from(&now);
        if duration == 0 {
            return Err(TimerError::Validation(
                "task would end immediately".to_owned(),
            ));
        }
        let start = epoch_secs(&now);
        let end = start + duration as f64;
        let at_time = match request.timing {
            TimeSpec::Absolute { at_time } => Some(at_time),
            TimeSpec::Relative { .. } => None,
        };

        let task = TaskSnapshot {
            id: request.task_id.clone(),
            label: request.label.clone(),
            start_timestamp: Some(start),
            end_timestamp: Some(end),
            remaining_seconds: Some(duration as f64),
            start_actions: request.start_actions.clone(),
            finish_actions: request.finish_actions.clone(),
            time_mode: request.timing.mode(),
            at_time,
            notifications: request.notifications.clone(),
        };

        let mut state = self.lock();
        if state.tasks.insert(request.task_id.clone(), task.clone()).is_some() {
            info!(task_id = %request.task_id, "replacing existing task");
        }

        let prefs = state.preferences.entry(request.task_id.clone()).or_default();
        let mut history = prefs.history.take().unwrap_or_default();
        push_history(&mut history, request.to_history_entry(start), HISTORY_LIMIT);
        prefs.history = Some(history);
        prefs.last_time_mode = Some(request.timing.mode());
        match request.timing {
            TimeSpec::Relative { delay, unit } => {
                prefs.last_delay = Some(delay);
                prefs.last_unit = Some(unit);
            }
            TimeSpec::Absolute { at_time } => prefs.last_at_time = Some(at_time),
        }
        if request.command.is_some() {
            prefs.last_command.clone_from(&request.command);
        }
        prefs.notify_primary = Some(request.notifications.notify_primary);
        prefs.notify_channel = Some(request.notifications.notify_channel);

        info!(task_id = %task.id, end, "task started");
        self.publish(&state);
        Ok(task)
    }

    fn cancel(&self, task_id: &str) -> Result<bool> {
        let mut state = self.lock();
        let removed = state.tasks.remove(task_id).is_some();
        if removed {
            info!(task_id, "task cancelled");
            self.publish(&state);
        }
        Ok(removed)
    }

    fn set_preferences(&self, entity: &str, patch: &Preferences) -> Result<Preferences> {
        let mut state = self.lock();
        let prefs = state.preferences.entry(entity.to_owned()).or_default();
        prefs.merge(patch);
        if let Some(history) = prefs.history.as_mut() {
            history.truncate(HISTORY_LIMIT);
        }
        let merged = prefs.clone();
        self.publish(&state);
        Ok(merged)
    }

    fn preferences(&self, entity: Option<&str>) -> Result<serde_json::Value> {
        let state = self.lock();
        let value = match entity {
            Some(entity) => serde_json::to_value(
                state.preferences.get(entity).cloned().unwrap_or_default(),
            ),
            None => serde_json::to_value(&state.preferences),
        };
        value.map_err(|e| TimerError::Channel(format!("failed to serialize preferences: {e}")))
    }

    fn snapshot(&self) -> Result<MonitorSnapshot> {
        let now = epoch_secs(&self.now());
        Ok(Self::build_snapshot(&self.lock(), now))
    }
}
