//! Keeps one panel bound to the host's open detail view.
//!
//! The engine is driven by host events (tree mutations, a detail view
//! opening or closing), by its own bounded retry loop, by panel interval
//! ticks and by snapshot changes. It never holds authority over a schedule:
//! the panel composes, resolves and submits exactly like a card does.

use crate::binding::discovery::{Discovery, DiscoveryOutcome};
use crate::binding::panel::{BoundPanel, find_panels};
use crate::binding::retry::{RetryLoop, RetryStep};
use crate::binding::tree::{HostTree, NodeId};
use crate::client::SchedulingClient;
use crate::commands;
use crate::config::{BindingConfig, EngineConfig, TimerConfig};
use crate::countdown::{CountdownView, IntervalSpawner};
use crate::error::{Result, TimerError};
use crate::form::{FormDefaults, ScheduleForm};
use crate::preferences::{HistoryEntry, PreferenceCache, PreferenceField};
use crate::snapshot::MonitorSnapshot;
use crate::surface::{InlineError, entity_request};
use crate::timing::TimeSpec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BindingState {
    #[default]
    Searching,
    Bound {
        subject: String,
    },
    TornDown,
}

/// Signals from the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Something below the host root changed.
    TreeMutated,
    /// The host opened an entity detail view; its structure may still be
    /// under construction.
    DetailOpened,
    DetailClosed,
}

/// User interaction with the bound panel.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelAction {
    Schedule,
    Cancel,
    SelectHistory(usize),
    SetTiming(TimeSpec),
    SetCommand(Option<String>),
    SetParameter { key: String, value: String },
    SetRunNow(bool),
    SetNotifyPrimary(bool),
    SetNotifyChannel(bool),
    SetNotifyTargets(Vec<String>),
    /// A form field took focus; snapshots leave it alone until `EndEdit`.
    BeginEdit(PreferenceField),
    EndEdit(PreferenceField),
}

/// Result of one binding attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// A new panel was injected.
    Bound { subject: String },
    /// The existing panel already matched; only its live state was updated.
    Refreshed { subject: String },
    /// A stale panel was torn down and a new one injected.
    Rebound { previous: String, subject: String },
    /// The subject has nothing to schedule.
    Rejected { subject: String },
    /// No attachment point yet.
    Miss,
    /// The panel was removed after repeated misses or an explicit unbind.
    TornDown { subject: String },
}

/// Discovery-and-binding state machine over a host tree.
#[derive(Debug)]
pub struct BindingEngine<T: HostTree, S: IntervalSpawner> {
    tree: T,
    spawner: S,
    discovery: Discovery,
    binding: BindingConfig,
    engine: EngineConfig,
    client: SchedulingClient,
    prefs: PreferenceCache,
    defaults: FormDefaults,
    snapshot: Arc<MonitorSnapshot>,
    panel: Option<BoundPanel>,
    retry: RetryLoop,
    misses: u32,
    state: BindingState,
}

impl<T: HostTree, S: IntervalSpawner> BindingEngine<T, S> {
    pub fn new(
        tree: T,
        spawner: S,
        client: SchedulingClient,
        prefs: PreferenceCache,
        config: &TimerConfig,
    ) -> Self {
        Self {
            tree,
            spawner,
            discovery: Discovery::from_config(&config.binding),
            retry: RetryLoop::new(
                config.binding.retry_interval(),
                config.binding.max_retry_attempts,
            ),
            binding: config.binding.clone(),
            engine: config.engine.clone(),
            client,
            prefs,
            defaults: FormDefaults::default(),
            snapshot: Arc::default(),
            panel: None,
            misses: 0,
            state: BindingState::Searching,
        }
    }

    /// Form defaults for newly bound panels.
    #[must_use]
    pub fn with_defaults(mut self, defaults: FormDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    #[must_use]
    pub fn state(&self) -> &BindingState {
        &self.state
    }

    #[must_use]
    pub fn panel(&self) -> Option<&BoundPanel> {
        self.panel.as_ref()
    }

    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.retry.is_pending()
    }

    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        self.retry.interval()
    }

    /// Start binding: equivalent to the host opening a detail view.
    pub fn bind_host_surface(&mut self, now: f64) -> BindOutcome {
        self.handle(HostEvent::DetailOpened, now)
    }

    /// Tear down any panel and stop retrying.
    pub fn unbind(&mut self) -> BindOutcome {
        self.retry.finish();
        self.misses = 0;
        match self.teardown_panel() {
            Some(subject) => {
                self.state = BindingState::TornDown;
                info!(subject = %subject, "host surface unbound");
                BindOutcome::TornDown { subject }
            }
            None => {
                self.state = BindingState::Searching;
                BindOutcome::Miss
            }
        }
    }

    pub fn handle(&mut self, event: HostEvent, now: f64) -> BindOutcome {
        trace!(?event, "host event");
        match event {
            HostEvent::TreeMutated => self.attempt(now),
            HostEvent::DetailOpened => {
                self.retry.arm();
                self.retry_step(now)
            }
            HostEvent::DetailClosed => self.unbind(),
        }
    }

    /// Run the next retry attempt, if one is pending.
    pub fn retry_tick(&mut self, now: f64) -> Option<BindOutcome> {
        if !self.retry.is_pending() {
            return None;
        }
        Some(self.retry_step(now))
    }

    fn retry_step(&mut self, now: f64) -> BindOutcome {
        let outcome = self.attempt(now);
        if outcome == BindOutcome::Miss {
            if self.retry.record_miss() == RetryStep::GiveUp {
                debug!("host attachment point still missing; waiting for next trigger");
            }
        } else {
            self.retry.finish();
        }
        outcome
    }

    /// One discovery-and-bind pass.
    pub fn attempt(&mut self, now: f64) -> BindOutcome {
        self.sweep_strays();

        let attachment = match self.discovery.discover(&self.tree) {
            DiscoveryOutcome::Found(attachment) => attachment,
            DiscoveryOutcome::Miss => return self.on_miss(),
        };
        self.misses = 0;
        let subject = attachment.subject;

        if commands::commands_for(&subject).is_empty() {
            debug!(subject = %subject, "subject has no schedulable commands");
            self.teardown_panel();
            self.state = BindingState::Searching;
            return BindOutcome::Rejected { subject };
        }

        let ttl = self.engine.inline_error_ttl_secs;
        if let Some(panel) = self.panel.as_mut() {
            if panel.is_bound_to(&self.tree, attachment.container, &subject) {
                panel.refresh(&mut self.tree, &self.snapshot, now, ttl);
                return BindOutcome::Refreshed { subject };
            }
        }

        let previous = self.teardown_panel();
        let interval = self.spawner.spawn(self.engine.tick_interval(), &subject);
        let form = ScheduleForm::from_preferences(&self.prefs.read(&subject), &self.defaults);
        let Some(mut panel) =
            BoundPanel::inject(&mut self.tree, attachment.container, &subject, form, interval)
        else {
            self.state = BindingState::Searching;
            return BindOutcome::Miss;
        };
        panel.refresh(&mut self.tree, &self.snapshot, now, ttl);
        self.panel = Some(panel);
        self.state = BindingState::Bound {
            subject: subject.clone(),
        };
        info!(subject = %subject, strategy = attachment.strategy, "panel bound");

        match previous {
            Some(previous) => BindOutcome::Rebound { previous, subject },
            None => BindOutcome::Bound { subject },
        }
    }

    fn on_miss(&mut self) -> BindOutcome {
        self.misses = self.misses.saturating_add(1);
        if self.panel.is_some() && self.misses >= self.binding.miss_teardown_threshold {
            if let Some(subject) = self.teardown_panel() {
                self.state = BindingState::TornDown;
                info!(subject = %subject, misses = self.misses, "host surface gone; panel removed");
                return BindOutcome::TornDown { subject };
            }
        }
        debug!(misses = self.misses, "host attachment point not found");
        BindOutcome::Miss
    }

    /// Remove panel elements this engine does not own.
    fn sweep_strays(&mut self) {
        let own = self.panel.as_ref().map(BoundPanel::node);
        let strays: Vec<NodeId> = find_panels(&self.tree)
            .into_iter()
            .filter(|node| Some(*node) != own)
            .collect();
        for node in strays {
            debug!(?node, "removing stray panel");
            self.tree.remove(node);
        }
    }

    fn teardown_panel(&mut self) -> Option<String> {
        let panel = self.panel.take()?;
        let subject = panel.subject().to_owned();
        panel.teardown(&mut self.tree);
        Some(subject)
    }

    /// Fold a new snapshot in and refresh the panel.
    pub fn on_snapshot(&mut self, snapshot: Arc<MonitorSnapshot>, now: f64) -> Option<CountdownView> {
        self.prefs.merge_from_snapshot(&snapshot.preferences);
        self.snapshot = snapshot;
        self.refresh_panel(now)
    }

    /// Interval tick for the panel bound to `subject`. Ticks from a panel
    /// that has since been replaced are ignored.
    pub fn on_panel_tick(&mut self, subject: &str, now: f64) -> Option<CountdownView> {
        if self.panel.as_ref().map(BoundPanel::subject) != Some(subject) {
            trace!(subject, "tick for a panel that is no longer bound");
            return None;
        }
        self.refresh_panel(now)
    }

    fn refresh_panel(&mut self, now: f64) -> Option<CountdownView> {
        let ttl = self.engine.inline_error_ttl_secs;
        let panel = self.panel.as_mut()?;
        Some(panel.refresh(&mut self.tree, &self.snapshot, now, ttl).clone())
    }

    fn bound_panel(&mut self) -> Result<&mut BoundPanel> {
        self.panel
            .as_mut()
            .ok_or_else(|| TimerError::Configuration("no panel is bound".to_owned()))
    }

    /// History entries offered on the bound panel.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.panel.as_ref().map_or_else(Vec::new, |panel| {
            self.prefs
                .display_history(panel.subject(), self.engine.history_display_limit)
        })
    }

    pub async fn perform(&mut self, action: PanelAction, now: f64) -> Result<()> {
        match action {
            PanelAction::Schedule => self.submit(now).await,
            PanelAction::Cancel => self.cancel(now).await,
            PanelAction::SelectHistory(index) => self.select_history(index),
            PanelAction::SetTiming(timing) => self.set_timing(timing),
            PanelAction::SetCommand(command) => {
                let panel = self.bound_panel()?;
                panel.form.command = command;
                panel.form.parameters.clear();
                self.persist_form();
                Ok(())
            }
            PanelAction::SetParameter { key, value } => {
                self.bound_panel()?.form.parameters.insert(key, value);
                Ok(())
            }
            PanelAction::SetRunNow(run_now) => {
                self.bound_panel()?.form.run_now = run_now;
                Ok(())
            }
            PanelAction::SetNotifyPrimary(enabled) => {
                self.bound_panel()?.form.notifications.notify_primary = enabled;
                self.persist_form();
                Ok(())
            }
            PanelAction::SetNotifyChannel(enabled) => {
                self.bound_panel()?.form.notifications.notify_channel = enabled;
                self.persist_form();
                Ok(())
            }
            PanelAction::SetNotifyTargets(targets) => {
                self.bound_panel()?.form.notifications.notify_targets = targets;
                self.persist_form();
                Ok(())
            }
            PanelAction::BeginEdit(field) => {
                let subject = self.bound_panel()?.subject().to_owned();
                self.prefs.begin_edit(&subject, field);
                Ok(())
            }
            PanelAction::EndEdit(field) => {
                let subject = self.bound_panel()?.subject().to_owned();
                self.prefs.end_edit(&subject, field);
                Ok(())
            }
        }
    }

    /// Schedule from the panel's form.
    ///
    /// Failures are raised inline on the panel; the panel stays in its
    /// pre-request state until a snapshot shows the task.
    pub async fn submit(&mut self, now: f64) -> Result<()> {
        let panel = self
            .panel
            .as_mut()
            .ok_or_else(|| TimerError::Configuration("no panel is bound".to_owned()))?;
        let subject = panel.subject().to_owned();
        let result = match entity_request(&subject, &subject, &panel.form, None) {
            Ok(request) => self.client.schedule(&request).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                panel.error = None;
                self.prefs.write(&subject, panel.form.to_preferences());
                Ok(())
            }
            Err(e) => {
                warn!(subject = %subject, error = %e, "panel schedule failed");
                panel.error = Some(InlineError::new(e.to_string(), now));
                Err(e)
            }
        }
    }

    /// Cancel the task the panel currently shows.
    pub async fn cancel(&mut self, now: f64) -> Result<()> {
        let panel = self
            .panel
            .as_mut()
            .ok_or_else(|| TimerError::Configuration("no panel is bound".to_owned()))?;
        let key = panel
            .view()
            .task_key
            .clone()
            .unwrap_or_else(|| panel.subject().to_owned());
        if let Err(e) = self.client.cancel(&key).await {
            warn!(task_id = %key, error = %e, "panel cancel failed");
            panel.error = Some(InlineError::new(e.to_string(), now));
            return Err(e);
        }
        panel.error = None;
        Ok(())
    }

    /// Rehydrate the panel's form from a displayed history entry.
    pub fn select_history(&mut self, index: usize) -> Result<()> {
        let entry = self
            .history()
            .into_iter()
            .nth(index)
            .ok_or_else(|| TimerError::Validation(format!("no history entry {index}")))?;
        self.bound_panel()?.form.apply_history(&entry)
    }

    pub fn set_timing(&mut self, timing: TimeSpec) -> Result<()> {
        timing.validate()?;
        self.bound_panel()?.form.timing = timing;
        self.persist_form();
        Ok(())
    }

    fn persist_form(&self) {
        if let Some(panel) = self.panel.as_ref() {
            self.prefs.write(panel.subject(), panel.form.to_preferences());
        }
    }
}
