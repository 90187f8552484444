//! Task composition.
//!
//! Turns the targets configured on a surface into the two ordered action lists
//! the backend executes: `start_actions` fire as soon as the task is accepted,
//! `finish_actions` fire when the countdown ends. Ordering inside each phase is
//! the execution order on the backend.

use crate::commands;
use crate::error::{Result, TimerError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// When a target fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Immediately when the schedule is accepted.
    Start,
    /// When the countdown ends.
    #[default]
    Finish,
}

/// One configured entity + command + parameters unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Entity the command applies to.
    #[serde(default, alias = "entity_id", skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Command identifier (see [`crate::commands`]).
    #[serde(default, alias = "action", skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Command parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    /// Missing phase means `finish`.
    #[serde(default)]
    pub phase: Phase,
}

impl Target {
    /// A finish-phase target with no parameters.
    pub fn finish(entity: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            entity: Some(entity.into()),
            command: Some(command.into()),
            parameters: Map::new(),
            phase: Phase::Finish,
        }
    }

    /// A start-phase target with no parameters.
    pub fn start(entity: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            phase: Phase::Start,
            ..Self::finish(entity, command)
        }
    }

    /// Attach parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// A target with neither an entity nor a command contributes nothing.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        blank(&self.entity) && blank(&self.command)
    }

    fn to_action(&self) -> Action {
        let entity = self
            .entity
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        let command = match self.command.as_deref().map(str::trim) {
            Some(command) if !command.is_empty() => command.to_owned(),
            _ => entity
                .as_deref()
                .map_or("toggle", commands::default_command)
                .to_owned(),
        };
        Action {
            command,
            entity,
            parameters: self.parameters.clone(),
        }
    }
}

/// One backend action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Command identifier.
    pub command: String,
    /// Entity the command applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Command parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

impl Action {
    /// A parameterless action against one entity.
    pub fn new(entity: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            entity: Some(entity.into()),
            parameters: Map::new(),
        }
    }
}

/// Actions partitioned by phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionList {
    #[serde(default)]
    pub start_actions: Vec<Action>,
    #[serde(default)]
    pub finish_actions: Vec<Action>,
}

impl ActionList {
    /// No actions in either phase.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_actions.is_empty() && self.finish_actions.is_empty()
    }

    /// Entities touched by any action, in first-seen order.
    #[must_use]
    pub fn entities(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for action in self.start_actions.iter().chain(&self.finish_actions) {
            match action.entity.as_deref() {
                Some(entity) if !seen.contains(&entity) => seen.push(entity),
                _ => {}
            }
        }
        seen
    }
}

/// Partition targets into start/finish action lists.
///
/// Inert targets are dropped; relative order within each phase is preserved.
#[must_use]
pub fn compose(targets: &[Target]) -> ActionList {
    let mut list = ActionList::default();
    for target in targets.iter().filter(|t| !t.is_inert()) {
        let action = target.to_action();
        match target.phase {
            Phase::Start => list.start_actions.push(action),
            Phase::Finish => list.finish_actions.push(action),
        }
    }
    list
}

/// Single finish action for a legacy single-entity surface.
#[must_use]
pub fn legacy_fallback(entity: &str) -> ActionList {
    ActionList {
        start_actions: Vec::new(),
        finish_actions: vec![Action::new(entity, commands::default_command(entity))],
    }
}

/// Compose for a surface that may be configured with explicit targets, a
/// legacy entity, or both.
///
/// The legacy fallback only applies when no explicit targets exist at all; a
/// list of inert targets composes to empty lists rather than falling back.
pub fn compose_for_surface(targets: &[Target], legacy_entity: Option<&str>) -> Result<ActionList> {
    if !targets.is_empty() {
        return Ok(compose(targets));
    }
    match legacy_entity.map(str::trim).filter(|e| !e.is_empty()) {
        Some(entity) => Ok(legacy_fallback(entity)),
        None => Err(TimerError::Configuration(
            "no targets and no entity configured".to_owned(),
        )),
    }
}

/// Targets for run-now mode: `command` fires immediately and its reverse is
/// scheduled for when the countdown ends.
#[must_use]
pub fn run_now_targets(entity: &str, command: &str, parameters: Map<String, Value>) -> Vec<Target> {
    vec![
        Target::start(entity, command).with_parameters(parameters),
        Target::finish(entity, commands::reverse_command(command)),
    ]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn inert() -> Target {
        Target {
            entity: None,
            command: Some("  ".to_owned()),
            parameters: Map::new(),
            phase: Phase::Start,
        }
    }

    #[test]
    fn compose_drops_inert_and_keeps_phase_order() {
        let targets = vec![
            Target::finish("switch.a", "off"),
            inert(),
            Target::start("light.b", "on"),
            Target::finish("switch.c", "on"),
            Target::start("light.d", "off"),
        ];
        let list = compose(&targets);
        let finish: Vec<_> = list
            .finish_actions
            .iter()
            .map(|a| a.entity.as_deref().unwrap())
            .collect();
        let start: Vec<_> = list
            .start_actions
            .iter()
            .map(|a| a.entity.as_deref().unwrap())
            .collect();
        assert_eq!(finish, vec!["switch.a", "switch.c"]);
        assert_eq!(start, vec!["light.b", "light.d"]);
    }

    #[test]
    fn compose_empty_yields_empty_lists() {
        let list = compose(&[]);
        assert!(list.start_actions.is_empty());
        assert!(list.finish_actions.is_empty());
        assert!(compose(&[inert(), inert()]).is_empty());
    }

    #[test]
    fn missing_phase_deserializes_as_finish() {
        let target: Target =
            serde_json::from_str(r#"{"entity_id": "light.x", "action": "off"}"#).unwrap();
        assert_eq!(target.phase, Phase::Finish);
        assert_eq!(target.entity.as_deref(), Some("light.x"));
        assert_eq!(target.command.as_deref(), Some("off"));
    }

    #[test]
    fn entity_without_command_uses_domain_default() {
        let target = Target {
            entity: Some("cover.garage".to_owned()),
            ..Target::default()
        };
        let list = compose(&[target]);
        assert_eq!(list.finish_actions[0].command, "close_cover");
    }

    #[test]
    fn legacy_fallback_only_without_explicit_targets() {
        let list = compose_for_surface(&[], Some("switch.heater")).unwrap();
        assert_eq!(list.finish_actions, vec![Action::new("switch.heater", "off")]);

        let list = compose_for_surface(&[inert()], Some("switch.heater")).unwrap();
        assert!(list.finish_actions.is_empty());

        assert!(compose_for_surface(&[], None).is_err());
    }

    #[test]
    fn run_now_pairs_command_with_reverse() {
        let list = compose(&run_now_targets("light.desk", "on", Map::new()));
        assert_eq!(list.start_actions, vec![Action::new("light.desk", "on")]);
        assert_eq!(list.finish_actions, vec![Action::new("light.desk", "off")]);
    }

    #[test]
    fn entities_are_deduplicated_in_order() {
        let list = compose(&[
            Target::start("light.a", "on"),
            Target::finish("light.a", "off"),
            Target::finish("fan.b", "off"),
        ]);
        assert_eq!(list.entities(), vec!["light.a", "fan.b"]);
    }
}
