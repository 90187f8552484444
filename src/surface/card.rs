//! Full card and compact tile.

use crate::client::{ScheduleRequest, SchedulingClient};
use crate::composer::{self, ActionList};
use crate::config::{CardConfig, EngineConfig, SurfaceLayout};
use crate::countdown::{CountdownView, IntervalHandle, SurfaceTracker};
use crate::error::{Result, TimerError};
use crate::form::{FormDefaults, ScheduleForm};
use crate::preferences::{HistoryEntry, PreferenceCache, PreferenceField, Preferences};
use crate::resolver::SurfaceIdentity;
use crate::snapshot::MonitorSnapshot;
use crate::surface::{InlineError, entity_request, expire_inline_error};
use crate::timing::{AtTime, TimeMode, TimeSpec, TimeUnit};
use tracing::warn;

/// One configured card or tile.
#[derive(Debug)]
pub struct CardSurface {
    config: CardConfig,
    identity: SurfaceIdentity,
    /// Key the card schedules and remembers preferences under.
    key: String,
    defaults: FormDefaults,
    form: ScheduleForm,
    tracker: SurfaceTracker,
    view: CountdownView,
    error: Option<InlineError>,
    client: SchedulingClient,
    prefs: PreferenceCache,
    history_limit: usize,
    error_ttl_secs: u64,
    ticker: Option<IntervalHandle>,
}

impl CardSurface {
    /// Build a card from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Configuration`] when the card has no identity
    /// key, no entity and no targets.
    pub fn new(
        config: CardConfig,
        client: SchedulingClient,
        prefs: PreferenceCache,
        engine: &EngineConfig,
    ) -> Result<Self> {
        let identity = config.identity();
        let key = identity
            .submission_key()
            .map(str::to_owned)
            .ok_or_else(|| TimerError::Configuration("card has no task identity".to_owned()))?;
        let defaults = config.form_defaults();
        let mut form = ScheduleForm::from_preferences(&prefs.read(&key), &defaults);
        form.run_now = config.run_now;
        if form.command.is_none() {
            form.command = config.command.clone();
        }
        Ok(Self {
            config,
            identity,
            key,
            defaults,
            form,
            tracker: SurfaceTracker::new(),
            view: CountdownView::default(),
            error: None,
            client,
            prefs,
            history_limit: engine.history_display_limit,
            error_ttl_secs: engine.inline_error_ttl_secs,
            ticker: None,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn identity(&self) -> &SurfaceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn layout(&self) -> SurfaceLayout {
        self.config.layout
    }

    #[must_use]
    pub fn view(&self) -> &CountdownView {
        &self.view
    }

    #[must_use]
    pub fn form(&self) -> &ScheduleForm {
        &self.form
    }

    #[must_use]
    pub fn error(&self) -> Option<&InlineError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.config.label.as_deref()
    }

    /// Attach the periodic recompute. A previous ticker is cancelled.
    pub fn attach_ticker(&mut self, handle: IntervalHandle) {
        if let Some(mut previous) = self.ticker.replace(handle) {
            previous.cancel();
        }
    }

    /// Release the periodic recompute; the card is going away.
    pub fn destroy(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    /// Start and finish actions for the current configuration and form.
    ///
    /// Explicit targets win. A legacy single-entity card schedules the
    /// chosen command (or the domain default) on its entity.
    pub fn compose(&self) -> Result<ActionList> {
        match self.config.entity.as_deref() {
            Some(entity) if self.config.targets.is_empty() => {
                Ok(composer::compose(&self.form.targets_for(entity)?))
            }
            _ => composer::compose_for_surface(&self.config.targets, None),
        }
    }

    pub fn build_request(&self) -> Result<ScheduleRequest> {
        let label = self.config.label.clone();
        match self.config.entity.as_deref() {
            Some(entity) if self.config.targets.is_empty() => {
                entity_request(&self.key, entity, &self.form, label)
            }
            _ => Ok(ScheduleRequest::new(&self.key, self.compose()?, self.form.timing.clone())
                .with_label(label)
                .with_notifications(self.form.notifications.clone())),
        }
    }

    /// Whether the schedule control should be enabled.
    #[must_use]
    pub fn can_schedule(&self) -> bool {
        self.compose()
            .is_ok_and(|actions| !actions.finish_actions.is_empty())
    }

    /// Submit a schedule for this card.
    ///
    /// The card keeps showing its controls until a snapshot carries the
    /// task. A failure is raised inline and returned.
    pub async fn submit(&mut self, now: f64) -> Result<()> {
        let result = match self.build_request() {
            Ok(request) => self.client.schedule(&request).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                self.error = None;
                self.prefs.write(&self.key, self.form.to_preferences());
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %self.key, error = %e, "card schedule failed");
                self.error = Some(InlineError::new(e.to_string(), now));
                Err(e)
            }
        }
    }

    /// Cancel the task currently shown, or the card's own key.
    pub async fn cancel(&mut self, now: f64) -> Result<()> {
        let key = self
            .view
            .task_key
            .clone()
            .unwrap_or_else(|| self.key.clone());
        if let Err(e) = self.client.cancel(&key).await {
            warn!(task_id = %key, error = %e, "card cancel failed");
            self.error = Some(InlineError::new(e.to_string(), now));
            return Err(e);
        }
        self.error = None;
        Ok(())
    }

    /// Periodic recompute against the latest snapshot.
    pub fn tick(&mut self, snapshot: &MonitorSnapshot, now: f64) -> &CountdownView {
        self.view = self.tracker.tick(&self.identity, snapshot, now);
        expire_inline_error(&mut self.error, now, self.error_ttl_secs);
        &self.view
    }

    /// A new snapshot arrived: merge preferences, then recompute.
    pub fn on_snapshot(&mut self, snapshot: &MonitorSnapshot, now: f64) -> &CountdownView {
        self.prefs.merge_from_snapshot(&snapshot.preferences);
        self.tick(snapshot, now)
    }

    /// Displayed history, newest first.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.prefs.display_history(&self.key, self.history_limit)
    }

    /// Rehydrate the form from a displayed history entry.
    pub fn select_history(&mut self, index: usize) -> Result<()> {
        let entry = self
            .history()
            .into_iter()
            .nth(index)
            .ok_or_else(|| TimerError::Validation(format!("no history entry {index}")))?;
        self.form.apply_history(&entry)
    }

    fn remember(&self, patch: Preferences) {
        self.prefs.write(&self.key, patch);
    }

    pub fn set_delay(&mut self, delay: u32) -> Result<()> {
        let unit = match self.form.timing {
            TimeSpec::Relative { unit, .. } => unit,
            TimeSpec::Absolute { .. } => self.defaults.unit,
        };
        self.form.timing = TimeSpec::relative(delay, unit)?;
        self.remember(Preferences {
            last_time_mode: Some(TimeMode::Relative),
            last_delay: Some(delay),
            ..Preferences::default()
        });
        Ok(())
    }

    pub fn set_unit(&mut self, unit: TimeUnit) -> Result<()> {
        let delay = match self.form.timing {
            TimeSpec::Relative { delay, .. } => delay,
            TimeSpec::Absolute { .. } => self.defaults.delay,
        };
        self.form.timing = TimeSpec::relative(delay, unit)?;
        self.remember(Preferences {
            last_time_mode: Some(TimeMode::Relative),
            last_unit: Some(unit),
            ..Preferences::default()
        });
        Ok(())
    }

    pub fn set_at_time(&mut self, at_time: AtTime) {
        self.form.timing = TimeSpec::Absolute { at_time };
        self.remember(Preferences {
            last_time_mode: Some(TimeMode::Absolute),
            last_at_time: Some(at_time),
            ..Preferences::default()
        });
    }

    pub fn set_time_mode(&mut self, mode: TimeMode) {
        let prefs = self.prefs.read(&self.key);
        self.form.set_time_mode(mode, &prefs, &self.defaults);
        self.remember(Preferences {
            last_time_mode: Some(mode),
            ..Preferences::default()
        });
    }

    /// Choose the command; parameter input for the old command is dropped.
    pub fn set_command(&mut self, command: Option<String>) {
        self.form.command = command.clone();
        self.form.parameters.clear();
        if command.is_some() {
            self.remember(Preferences {
                last_command: command,
                ..Preferences::default()
            });
        }
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.form.parameters.insert(key.into(), value.into());
    }

    pub fn set_run_now(&mut self, run_now: bool) {
        self.form.run_now = run_now;
    }

    pub fn set_notify_primary(&mut self, enabled: bool) {
        self.form.notifications.notify_primary = enabled;
        self.remember(Preferences {
            notify_primary: Some(enabled),
            ..Preferences::default()
        });
    }

    pub fn set_notify_channel(&mut self, enabled: bool) {
        self.form.notifications.notify_channel = enabled;
        self.remember(Preferences {
            notify_channel: Some(enabled),
            ..Preferences::default()
        });
    }

    pub fn set_notify_targets(&mut self, targets: Vec<String>) {
        self.form.notifications.notify_targets = targets.clone();
        self.remember(Preferences {
            notify_targets: Some(targets),
            ..Preferences::default()
        });
    }

    /// Mark a form field as focused so inbound snapshots leave it alone.
    pub fn begin_edit(&self, field: PreferenceField) {
        self.prefs.begin_edit(&self.key, field);
    }

    pub fn end_edit(&self, field: PreferenceField) {
        self.prefs.end_edit(&self.key, field);
    }
}

impl Drop for CardSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}
