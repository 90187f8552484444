//! Per-entity preferences and schedule history.
//!
//! [`PreferenceCache`] is the session-scoped store every surface reads from.
//! It is created once by the host and passed explicitly to each surface.
//! Writes land in the cache synchronously and are persisted to the backend
//! in the background; snapshots from the backend are merged back in without
//! clobbering fields a surface is actively editing or has just written.

use crate::composer::Action;
use crate::error::Result;
use crate::timing::{AtTime, TimeMode, TimeUnit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Entries kept by the backend and shown by surfaces.
pub const HISTORY_LIMIT: usize = 3;

/// One previously scheduled task, enough to re-hydrate a form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub time_mode: TimeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<TimeUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_time: Option<AtTime>,
    /// Command chosen on a single-entity surface.
    #[serde(default, alias = "action", skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Per-command parameters as bound at submit time.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub start_actions: Vec<Action>,
    #[serde(default)]
    pub finish_actions: Vec<Action>,
    /// Epoch seconds when the entry was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl HistoryEntry {
    /// Two entries with the same key describe the same schedule.
    #[must_use]
    pub fn dedupe_key(&self) -> String {
        let actions = serde_json::to_string(&(&self.start_actions, &self.finish_actions))
            .unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.time_mode.as_str(),
            self.delay.map(|d| d.to_string()).unwrap_or_default(),
            self.unit.map(TimeUnit::as_str).unwrap_or_default(),
            self.at_time.map(|t| t.to_string()).unwrap_or_default(),
            self.command.as_deref().unwrap_or_default(),
            actions,
        )
    }
}

/// Insert `entry` at the front of `history`, dropping any duplicate and
/// trimming to `limit`.
pub fn push_history(history: &mut Vec<HistoryEntry>, entry: HistoryEntry, limit: usize) {
    let key = entry.dedupe_key();
    history.retain(|existing| existing.dedupe_key() != key);
    history.insert(0, entry);
    history.truncate(limit);
}

/// Remembered choices for one entity reference.
///
/// Every field is optional so the same type doubles as a partial patch:
/// `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_time_mode: Option<TimeMode>,
    #[serde(default, alias = "last_action", skip_serializing_if = "Option::is_none")]
    pub last_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_unit: Option<TimeUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_at_time: Option<AtTime>,
    #[serde(default, alias = "notify_ha", skip_serializing_if = "Option::is_none")]
    pub notify_primary: Option<bool>,
    #[serde(default, alias = "notify_mobile", skip_serializing_if = "Option::is_none")]
    pub notify_channel: Option<bool>,
    #[serde(default, alias = "notify_devices", skip_serializing_if = "Option::is_none")]
    pub notify_targets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

/// Individually mergeable preference fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceField {
    TimeMode,
    Command,
    Delay,
    Unit,
    AtTime,
    NotifyPrimary,
    NotifyChannel,
    NotifyTargets,
    History,
}

impl PreferenceField {
    pub const ALL: [Self; 9] = [
        Self::TimeMode,
        Self::Command,
        Self::Delay,
        Self::Unit,
        Self::AtTime,
        Self::NotifyPrimary,
        Self::NotifyChannel,
        Self::NotifyTargets,
        Self::History,
    ];
}

impl Preferences {
    /// Fields carrying a value.
    #[must_use]
    pub fn present_fields(&self) -> Vec<PreferenceField> {
        PreferenceField::ALL
            .into_iter()
            .filter(|field| self.has(*field))
            .collect()
    }

    fn has(&self, field: PreferenceField) -> bool {
        match field {
            PreferenceField::TimeMode => self.last_time_mode.is_some(),
            PreferenceField::Command => self.last_command.is_some(),
            PreferenceField::Delay => self.last_delay.is_some(),
            PreferenceField::Unit => self.last_unit.is_some(),
            PreferenceField::AtTime => self.last_at_time.is_some(),
            PreferenceField::NotifyPrimary => self.notify_primary.is_some(),
            PreferenceField::NotifyChannel => self.notify_channel.is_some(),
            PreferenceField::NotifyTargets => self.notify_targets.is_some(),
            PreferenceField::History => self.history.is_some(),
        }
    }

    fn take_field(&mut self, other: &Self, field: PreferenceField) {
        match field {
            PreferenceField::TimeMode => self.last_time_mode = other.last_time_mode,
            PreferenceField::Command => self.last_command.clone_from(&other.last_command),
            PreferenceField::Delay => self.last_delay = other.last_delay,
            PreferenceField::Unit => self.last_unit = other.last_unit,
            PreferenceField::AtTime => self.last_at_time = other.last_at_time,
            PreferenceField::NotifyPrimary => self.notify_primary = other.notify_primary,
            PreferenceField::NotifyChannel => self.notify_channel = other.notify_channel,
            PreferenceField::NotifyTargets => self.notify_targets.clone_from(&other.notify_targets),
            PreferenceField::History => self.history.clone_from(&other.history),
        }
    }

    /// Overlay every present field of `patch`.
    pub fn merge(&mut self, patch: &Self) {
        for field in patch.present_fields() {
            self.take_field(patch, field);
        }
    }

    /// Stored history, newest first.
    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        self.history.as_deref().unwrap_or_default()
    }
}

/// Durable destination for preference writes.
#[async_trait]
pub trait PreferenceSink: Send + Sync {
    /// Persist a partial update for `entity`.
    async fn persist(&self, entity: &str, patch: &Preferences) -> Result<()>;
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Preferences>,
    /// Fields a surface currently has focus on.
    editing: HashMap<String, HashSet<PreferenceField>>,
    /// Fields with a durable write in flight, counted per outstanding write.
    pending: HashMap<String, HashMap<PreferenceField, usize>>,
}

/// Session-wide preference store shared by every surface.
#[derive(Clone, Default)]
pub struct PreferenceCache {
    state: Arc<Mutex<CacheState>>,
    sink: Option<Arc<dyn PreferenceSink>>,
}

impl std::fmt::Debug for PreferenceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceCache")
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl PreferenceCache {
    /// A cache that only lives in memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that persists writes through `sink`.
    #[must_use]
    pub fn with_sink(sink: Arc<dyn PreferenceSink>) -> Self {
        Self {
            state: Arc::default(),
            sink: Some(sink),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached preferences for `entity`, or defaults when nothing is known.
    #[must_use]
    pub fn read(&self, entity: &str) -> Preferences {
        self.lock().entries.get(entity).cloned().unwrap_or_default()
    }

    /// Newest `limit` history entries for `entity`.
    #[must_use]
    pub fn display_history(&self, entity: &str, limit: usize) -> Vec<HistoryEntry> {
        self.lock()
            .entries
            .get(entity)
            .map(|prefs| prefs.history().iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Merge `patch` into the cache and persist it in the background.
    ///
    /// The local update is visible to every reader before this returns. The
    /// written fields are shielded from inbound snapshots only while the
    /// durable write is in flight; once it finishes (or fails) the next
    /// snapshot is authoritative again. The returned handle resolves at that
    /// point. It is `None` when there is no sink or no runtime to run it on,
    /// in which case nothing is shielded.
    pub fn write(&self, entity: &str, patch: Preferences) -> Option<JoinHandle<()>> {
        let fields = patch.present_fields();
        if fields.is_empty() {
            return None;
        }
        let persist = self
            .sink
            .as_ref()
            .zip(tokio::runtime::Handle::try_current().ok());
        {
            let mut state = self.lock();
            state
                .entries
                .entry(entity.to_owned())
                .or_default()
                .merge(&patch);
            if persist.is_some() {
                let pending = state.pending.entry(entity.to_owned()).or_default();
                for field in &fields {
                    *pending.entry(*field).or_default() += 1;
                }
            }
        }

        let (sink, runtime) = persist?;
        let sink = Arc::clone(sink);
        let cache = self.clone();
        let entity = entity.to_owned();
        Some(runtime.spawn(async move {
            let result = sink.persist(&entity, &patch).await;
            cache.clear_pending(&entity, &fields);
            if let Err(e) = result {
                tracing::warn!("failed to persist preferences for {entity}: {e}");
            }
        }))
    }

    /// Whether `field` of `entity` has a durable write in flight.
    #[must_use]
    pub fn is_pending(&self, entity: &str, field: PreferenceField) -> bool {
        self.lock()
            .pending
            .get(entity)
            .is_some_and(|fields| fields.contains_key(&field))
    }

    /// Record a scheduled task at the front of `entity`'s history.
    #[cfg(test)]
    pub fn record_history(&self, entity: &str, entry: HistoryEntry) -> Option<JoinHandle<()>> {
        let mut history = self.read(entity).history.unwrap_or_default();
        push_history(&mut history, entry, HISTORY_LIMIT);
        self.write(
            entity,
            Preferences {
                history: Some(history),
                ..Preferences::default()
            },
        )
    }

    /// Mark `field` as being edited so inbound snapshots leave it alone.
    pub fn begin_edit(&self, entity: &str, field: PreferenceField) {
        self.lock()
            .editing
            .entry(entity.to_owned())
            .or_default()
            .insert(field);
    }

    pub fn end_edit(&self, entity: &str, field: PreferenceField) {
        let mut state = self.lock();
        if let Some(fields) = state.editing.get_mut(entity) {
            fields.remove(&field);
        }
    }

    fn clear_pending(&self, entity: &str, fields: &[PreferenceField]) {
        let mut state = self.lock();
        let Some(pending) = state.pending.get_mut(entity) else {
            return;
        };
        for field in fields {
            if let Some(count) = pending.get_mut(field) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    pending.remove(field);
                }
            }
        }
        if pending.is_empty() {
            state.pending.remove(entity);
        }
    }

    /// Merge the backend's authoritative preferences into the cache.
    ///
    /// Only fields present in the snapshot are considered. Fields under edit
    /// and fields with a write still in flight keep their local value.
    pub fn merge_from_snapshot(&self, incoming: &BTreeMap<String, Preferences>) {
        let mut state = self.lock();
        let CacheState {
            entries,
            editing,
            pending,
        } = &mut *state;
        for (entity, authoritative) in incoming {
            let local = entries.entry(entity.clone()).or_default();
            let editing = editing.get(entity);
            let pending = pending.get(entity);
            for field in authoritative.present_fields() {
                let shielded = editing.is_some_and(|fields| fields.contains(&field))
                    || pending.is_some_and(|fields| fields.contains_key(&field));
                if !shielded {
                    local.take_field(authoritative, field);
                }
            }
        }
    }
}
