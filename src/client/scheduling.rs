//! Typed schedule/cancel requests and the client that submits them.
//!
//! The client never changes local surface state. A successful submission
//! shows up only once the backend publishes a snapshot containing the task.

use crate::composer::{Action, ActionList};
use crate::error::{Result, TimerError};
use crate::preferences::{HistoryEntry, PreferenceSink, Preferences};
use crate::snapshot::Notifications;
use crate::timing::TimeSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Everything the backend needs to start a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Identity key the task is published under.
    #[serde(alias = "entity_id")]
    pub task_id: String,
    #[serde(default, alias = "task_label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub timing: TimeSpec,
    #[serde(default)]
    pub start_actions: Vec<Action>,
    #[serde(default)]
    pub finish_actions: Vec<Action>,
    #[serde(flatten)]
    pub notifications: Notifications,
    /// Command chosen on a single-entity surface, kept for history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Bound parameters of `command`, kept for history.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

impl ScheduleRequest {
    pub fn new(task_id: impl Into<String>, actions: ActionList, timing: TimeSpec) -> Self {
        Self {
            task_id: task_id.into(),
            label: None,
            timing,
            start_actions: actions.start_actions,
            finish_actions: actions.finish_actions,
            notifications: Notifications::default(),
            command: None,
            parameters: Map::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label.filter(|l| !l.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_notifications(mut self, notifications: Notifications) -> Self {
        self.notifications = notifications;
        self
    }

    /// Record the chosen command and its parameters for history.
    #[must_use]
    pub fn with_command(mut self, command: Option<String>, parameters: Map<String, Value>) -> Self {
        self.command = command;
        self.parameters = parameters;
        self
    }

    /// Reject requests the backend would have to refuse.
    pub fn validate(&self) -> Result<()> {
        if self.task_id.trim().is_empty() {
            return Err(TimerError::Configuration(
                "schedule request has no task identity".to_owned(),
            ));
        }
        if self.finish_actions.is_empty() {
            return Err(TimerError::Configuration(
                "nothing to schedule: no finish actions".to_owned(),
            ));
        }
        if let Some(action) = self
            .start_actions
            .iter()
            .chain(&self.finish_actions)
            .find(|a| a.command.trim().is_empty())
        {
            return Err(TimerError::Validation(format!(
                "action for {} has no command",
                action.entity.as_deref().unwrap_or("<none>")
            )));
        }
        self.timing.validate()
    }

    /// Entities touched by any action, in first-seen order.
    #[must_use]
    pub fn entities(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for entity in self
            .start_actions
            .iter()
            .chain(&self.finish_actions)
            .filter_map(|a| a.entity.as_deref())
        {
            if !seen.contains(&entity) {
                seen.push(entity);
            }
        }
        seen
    }

    /// History entry describing this request.
    #[must_use]
    pub fn to_history_entry(&self, timestamp: f64) -> HistoryEntry {
        let (delay, unit, at_time) = match self.timing {
            TimeSpec::Relative { delay, unit } => (Some(delay), Some(unit), None),
            TimeSpec::Absolute { at_time } => (None, None, Some(at_time)),
        };
        HistoryEntry {
            time_mode: self.timing.mode(),
            delay,
            unit,
            at_time,
            command: self.command.clone(),
            parameters: self.parameters.clone(),
            start_actions: self.start_actions.clone(),
            finish_actions: self.finish_actions.clone(),
            timestamp: Some(timestamp),
        }
    }
}

/// Asynchronous channel to the scheduling backend.
#[async_trait]
pub trait ScheduleTransport: Send + Sync {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<()>;
    async fn cancel(&self, task_id: &str) -> Result<()>;
    async fn set_preferences(&self, entity: &str, patch: &Preferences) -> Result<()>;
}

/// Validates and submits requests on behalf of surfaces.
#[derive(Clone)]
pub struct SchedulingClient {
    transport: Arc<dyn ScheduleTransport>,
}

impl std::fmt::Debug for SchedulingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingClient").finish_non_exhaustive()
    }
}

impl SchedulingClient {
    pub fn new(transport: Arc<dyn ScheduleTransport>) -> Self {
        Self { transport }
    }

    /// Validate and submit. Validation failures never reach the transport.
    pub async fn schedule(&self, request: &ScheduleRequest) -> Result<()> {
        request.validate()?;
        self.transport.schedule(request).await?;
        info!(
            task_id = %request.task_id,
            mode = request.timing.mode().as_str(),
            start = request.start_actions.len(),
            finish = request.finish_actions.len(),
            "schedule accepted"
        );
        Ok(())
    }

    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        if task_id.trim().is_empty() {
            return Err(TimerError::Configuration(
                "cancel request has no task identity".to_owned(),
            ));
        }
        self.transport.cancel(task_id).await?;
        info!(task_id, "cancel accepted");
        Ok(())
    }
}

#[async_trait]
impl PreferenceSink for SchedulingClient {
    async fn persist(&self, entity: &str, patch: &Preferences) -> Result<()> {
        self.transport.set_preferences(entity, patch).await
    }
}
