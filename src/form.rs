//! Editable schedule form state for one surface.

use crate::commands;
use crate::composer::{self, Target};
use crate::error::{Result, TimerError};
use crate::preferences::{HistoryEntry, Preferences};
use crate::snapshot::Notifications;
use crate::timing::{AtTime, TimeMode, TimeSpec, TimeUnit};
use serde_json::Value;
use std::collections::BTreeMap;

/// Values a form falls back to when preferences are silent.
#[derive(Debug, Clone, PartialEq)]
pub struct FormDefaults {
    pub time_mode: TimeMode,
    pub delay: u32,
    pub unit: TimeUnit,
    pub at_time: Option<AtTime>,
    pub notifications: Notifications,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            time_mode: TimeMode::Relative,
            delay: 15,
            unit: TimeUnit::Minutes,
            at_time: None,
            notifications: Notifications::default(),
        }
    }
}

/// Current form values.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleForm {
    pub timing: TimeSpec,
    /// Chosen command on single-entity surfaces.
    pub command: Option<String>,
    /// Raw parameter input keyed by parameter key.
    pub parameters: BTreeMap<String, String>,
    pub notifications: Notifications,
    /// Fire the command now and schedule its reverse.
    pub run_now: bool,
}

impl ScheduleForm {
    /// Seed a form from remembered preferences, falling back to `defaults`.
    #[must_use]
    pub fn from_preferences(prefs: &Preferences, defaults: &FormDefaults) -> Self {
        let mode = prefs.last_time_mode.unwrap_or(defaults.time_mode);
        let at_time = prefs.last_at_time.or(defaults.at_time);
        let timing = match (mode, at_time) {
            (TimeMode::Absolute, Some(at_time)) => TimeSpec::Absolute { at_time },
            _ => TimeSpec::Relative {
                delay: prefs.last_delay.unwrap_or(defaults.delay),
                unit: prefs.last_unit.unwrap_or(defaults.unit),
            },
        };
        Self {
            timing,
            command: prefs.last_command.clone(),
            parameters: BTreeMap::new(),
            notifications: Notifications {
                notify_primary: prefs
                    .notify_primary
                    .unwrap_or(defaults.notifications.notify_primary),
                notify_channel: prefs
                    .notify_channel
                    .unwrap_or(defaults.notifications.notify_channel),
                notify_targets: prefs
                    .notify_targets
                    .clone()
                    .unwrap_or_else(|| defaults.notifications.notify_targets.clone()),
            },
            run_now: false,
        }
    }

    /// Replace every history-backed field with `entry` in one step.
    ///
    /// Notification settings are kept. Nothing from the previous timing
    /// survives: an absolute entry leaves no delay or unit behind.
    pub fn apply_history(&mut self, entry: &HistoryEntry) -> Result<()> {
        let timing = match entry.time_mode {
            TimeMode::Relative => TimeSpec::relative(
                entry
                    .delay
                    .ok_or_else(|| TimerError::Validation("history entry has no delay".to_owned()))?,
                entry.unit.unwrap_or_default(),
            )?,
            TimeMode::Absolute => TimeSpec::Absolute {
                at_time: entry.at_time.ok_or_else(|| {
                    TimerError::Validation("history entry has no time".to_owned())
                })?,
            },
        };
        let parameters = entry
            .parameters
            .iter()
            .map(|(key, value)| {
                let raw = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), raw)
            })
            .collect();

        *self = Self {
            timing,
            command: entry.command.clone(),
            parameters,
            notifications: self.notifications.clone(),
            run_now: self.run_now,
        };
        Ok(())
    }

    /// Switch between relative and absolute, seeding the new mode from
    /// `prefs` and `defaults`.
    pub fn set_time_mode(&mut self, mode: TimeMode, prefs: &Preferences, defaults: &FormDefaults) {
        if self.timing.mode() == mode {
            return;
        }
        self.timing = match mode {
            TimeMode::Relative => TimeSpec::Relative {
                delay: prefs.last_delay.unwrap_or(defaults.delay),
                unit: prefs.last_unit.unwrap_or(defaults.unit),
            },
            TimeMode::Absolute => TimeSpec::Absolute {
                at_time: prefs
                    .last_at_time
                    .or(defaults.at_time)
                    .unwrap_or(AtTime::MIDNIGHT),
            },
        };
    }

    /// The chosen command, or the domain default for `entity`.
    #[must_use]
    pub fn command_for<'a>(&'a self, entity: &str) -> &'a str {
        self.command
            .as_deref()
            .unwrap_or_else(|| commands::default_command(entity))
    }

    /// Raw parameter input bound against the chosen command's parameter
    /// kinds. Unknown commands carry no parameters.
    pub fn bound_parameters(&self, entity: &str) -> Result<serde_json::Map<String, Value>> {
        match commands::find_command(entity, self.command_for(entity)) {
            Some(spec) => spec.bind_parameters(&self.parameters),
            None => Ok(serde_json::Map::new()),
        }
    }

    /// Targets for a single-entity surface.
    ///
    /// Uses the chosen command (or the domain default) with bound
    /// parameters; run-now mode fires it immediately and schedules the
    /// reverse.
    pub fn targets_for(&self, entity: &str) -> Result<Vec<Target>> {
        let command = self.command_for(entity);
        let parameters = self.bound_parameters(entity)?;
        if self.run_now {
            return Ok(composer::run_now_targets(entity, command, parameters));
        }
        Ok(vec![Target::finish(entity, command).with_parameters(parameters)])
    }

    /// Preference patch capturing the current form.
    #[must_use]
    pub fn to_preferences(&self) -> Preferences {
        let mut prefs = Preferences {
            last_time_mode: Some(self.timing.mode()),
            last_command: self.command.clone(),
            notify_primary: Some(self.notifications.notify_primary),
            notify_channel: Some(self.notifications.notify_channel),
            notify_targets: Some(self.notifications.notify_targets.clone()),
            ..Preferences::default()
        };
        match self.timing {
            TimeSpec::Relative { delay, unit } => {
                prefs.last_delay = Some(delay);
                prefs.last_unit = Some(unit);
            }
            TimeSpec::Absolute { at_time } => prefs.last_at_time = Some(at_time),
        }
        prefs
    }
}
