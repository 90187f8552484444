//! Mirror of the backend's shared monitor snapshot.
//!
//! The snapshot is owned by the backend. Every surface reads it; none writes
//! it. It is distributed through a `watch` channel so readers always see the
//! most recently published value.

use crate::composer::Action;
use crate::preferences::Preferences;
use crate::timing::{AtTime, TimeMode, TimeUnit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Notification channels requested for a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifications {
    /// Persistent notification in the primary UI.
    #[serde(default, alias = "notify_ha")]
    pub notify_primary: bool,
    /// Push to the secondary channel (mobile apps).
    #[serde(default, alias = "notify_mobile")]
    pub notify_channel: bool,
    /// Specific channel targets; empty means every registered target.
    #[serde(default, alias = "notify_devices", skip_serializing_if = "Vec::is_empty")]
    pub notify_targets: Vec<String>,
}

impl Notifications {
    #[must_use]
    pub fn any(&self) -> bool {
        self.notify_primary || self.notify_channel
    }
}

/// One active task as published by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    #[serde(default, alias = "task_id")]
    pub id: String,
    #[serde(default, alias = "task_label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Epoch seconds when the task was accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<f64>,
    /// Epoch seconds when the finish actions fire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<f64>,
    /// Remaining seconds as computed by the backend at publish time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<f64>,
    #[serde(default)]
    pub start_actions: Vec<Action>,
    #[serde(default)]
    pub finish_actions: Vec<Action>,
    #[serde(default)]
    pub time_mode: TimeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_time: Option<AtTime>,
    #[serde(flatten)]
    pub notifications: Notifications,
}

/// A relative-time preset offered by the backend (e.g. 15 minutes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub delay: u32,
    pub unit: TimeUnit,
}

/// Everything the backend publishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Active tasks keyed by task identity.
    #[serde(default, alias = "active_tasks")]
    pub tasks: BTreeMap<String, TaskSnapshot>,
    /// Per-entity preferences, including history.
    #[serde(default)]
    pub preferences: BTreeMap<String, Preferences>,
    /// Relative-time presets.
    #[serde(default)]
    pub presets: Vec<Preset>,
}

impl MonitorSnapshot {
    #[must_use]
    pub fn task(&self, key: &str) -> Option<&TaskSnapshot> {
        self.tasks.get(key)
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Default presets used when the backend publishes none.
#[must_use]
pub fn default_presets() -> Vec<Preset> {
    [
        (5, TimeUnit::Minutes),
        (15, TimeUnit::Minutes),
        (30, TimeUnit::Minutes),
        (1, TimeUnit::Hours),
        (2, TimeUnit::Hours),
    ]
    .into_iter()
    .map(|(delay, unit)| Preset { delay, unit })
    .collect()
}

/// Writer half of the snapshot channel; held by the backend side only.
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    tx: watch::Sender<Arc<MonitorSnapshot>>,
}

/// Reader half of the snapshot channel; cloned into every surface.
#[derive(Debug, Clone)]
pub struct SnapshotFeed {
    rx: watch::Receiver<Arc<MonitorSnapshot>>,
}

/// Create a snapshot channel seeded with `initial`.
#[must_use]
pub fn snapshot_channel(initial: MonitorSnapshot) -> (SnapshotPublisher, SnapshotFeed) {
    let (tx, rx) = watch::channel(Arc::new(initial));
    (SnapshotPublisher { tx }, SnapshotFeed { rx })
}

impl SnapshotPublisher {
    /// Publish a new snapshot. Readers that have gone away are ignored.
    pub fn publish(&self, snapshot: MonitorSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    /// A new reader positioned at the current value.
    #[must_use]
    pub fn subscribe(&self) -> SnapshotFeed {
        SnapshotFeed {
            rx: self.tx.subscribe(),
        }
    }

    #[must_use]
    pub fn current(&self) -> Arc<MonitorSnapshot> {
        Arc::clone(&self.tx.borrow())
    }
}

impl SnapshotFeed {
    /// Most recently published snapshot, marking it seen.
    pub fn latest(&mut self) -> Arc<MonitorSnapshot> {
        Arc::clone(&self.rx.borrow_and_update())
    }

    /// Most recently published snapshot without marking it seen.
    #[must_use]
    pub fn peek(&self) -> Arc<MonitorSnapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next publish. Returns `false` once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn backend_monitor_attributes_deserialize() {
        let json = serde_json::json!({
            "active_tasks": {
                "qt_abc": {
                    "task_id": "qt_abc",
                    "task_label": "Heater",
                    "start_timestamp": 1000.0,
                    "end_timestamp": 1120.0,
                    "finish_actions": [{"command": "off", "entity": "switch.heater"}],
                    "notify_primary": true
                }
            }
        });
        let snapshot: MonitorSnapshot = serde_json::from_value(json).unwrap();
        let task = snapshot.task("qt_abc").unwrap();
        assert_eq!(task.label.as_deref(), Some("Heater"));
        assert_eq!(task.end_timestamp, Some(1120.0));
        assert!(task.notifications.notify_primary);
        assert!(task.start_actions.is_empty());
    }

    #[tokio::test]
    async fn feed_sees_latest_publish() {
        let (publisher, mut feed) = snapshot_channel(MonitorSnapshot::default());
        assert_eq!(feed.latest().task_count(), 0);

        let mut next = MonitorSnapshot::default();
        next.tasks.insert("a".to_owned(), TaskSnapshot::default());
        publisher.publish(next);

        assert!(feed.changed().await);
        assert_eq!(feed.latest().task_count(), 1);
    }

    #[tokio::test]
    async fn feed_reports_closed_publisher() {
        let (publisher, mut feed) = snapshot_channel(MonitorSnapshot::default());
        drop(publisher);
        assert!(!feed.changed().await);
    }
}
