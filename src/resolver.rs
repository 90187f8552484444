//! Maps a surface to the snapshot task that currently belongs to it.

use crate::composer::Target;
use crate::snapshot::{MonitorSnapshot, TaskSnapshot};

/// Keys a surface may be known by in the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceIdentity {
    /// Stable identity key generated for the surface.
    pub task_id: Option<String>,
    /// Entity of each configured target, in configured order.
    pub target_entities: Vec<String>,
    /// Single entity of a legacy surface.
    pub legacy_entity: Option<String>,
}

impl SurfaceIdentity {
    /// Identity of a bare single-entity surface (e.g. a bound host panel).
    pub fn for_entity(entity: impl Into<String>) -> Self {
        Self {
            task_id: None,
            target_entities: Vec::new(),
            legacy_entity: Some(entity.into()),
        }
    }

    /// Identity of a surface with an explicit key and targets.
    #[must_use]
    pub fn new(task_id: Option<String>, targets: &[Target], legacy_entity: Option<String>) -> Self {
        let mut target_entities: Vec<String> = Vec::new();
        for entity in targets.iter().filter_map(|t| t.entity.as_deref()) {
            let entity = entity.trim();
            if !entity.is_empty() && !target_entities.iter().any(|e| e == entity) {
                target_entities.push(entity.to_owned());
            }
        }
        Self {
            task_id: task_id.filter(|id| !id.trim().is_empty()),
            target_entities,
            legacy_entity: legacy_entity.filter(|e| !e.trim().is_empty()),
        }
    }

    /// Lookup keys in precedence order: own key, each target entity, then
    /// the legacy entity.
    pub fn lookup_keys(&self) -> impl Iterator<Item = &str> {
        self.task_id
            .as_deref()
            .into_iter()
            .chain(self.target_entities.iter().map(String::as_str))
            .chain(self.legacy_entity.as_deref())
    }

    /// Key used when submitting a new schedule for this surface.
    #[must_use]
    pub fn submission_key(&self) -> Option<&str> {
        self.task_id
            .as_deref()
            .or(self.legacy_entity.as_deref())
            .or_else(|| self.target_entities.first().map(String::as_str))
    }

    /// No key at all; nothing can ever resolve.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup_keys().next().is_none()
    }
}

/// A matched snapshot entry and the key it was found under.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub key: &'a str,
    pub task: &'a TaskSnapshot,
}

/// The first task in `snapshot` found under one of `identity`'s keys.
#[must_use]
pub fn resolve_task<'a>(
    identity: &'a SurfaceIdentity,
    snapshot: &'a MonitorSnapshot,
) -> Option<Resolved<'a>> {
    identity
        .lookup_keys()
        .find_map(|key| snapshot.task(key).map(|task| Resolved { key, task }))
}
