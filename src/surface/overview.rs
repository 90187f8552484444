//! List of every active task.

use crate::client::SchedulingClient;
use crate::countdown::tracker::{progress, remaining};
use crate::error::Result;
use crate::snapshot::MonitorSnapshot;
use crate::surface::{InlineError, expire_inline_error};
use std::cmp::Ordering;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewEntry {
    /// Snapshot key, used to cancel.
    pub key: String,
    /// Task label, falling back to the key.
    pub label: String,
    pub remaining_secs: f64,
    pub progress: f64,
    /// Entities the task touches, in first-seen order.
    pub entities: Vec<String>,
}

/// Entries for every task in `snapshot`, soonest end first.
///
/// Tasks without an end timestamp use the backend's remaining seconds.
/// Progress needs both ends of the window and is 0 otherwise.
#[must_use]
pub fn overview_entries(snapshot: &MonitorSnapshot, now: f64) -> Vec<OverviewEntry> {
    let mut entries: Vec<OverviewEntry> = snapshot
        .tasks
        .iter()
        .map(|(key, task)| {
            let end = task
                .end_timestamp
                .or_else(|| task.remaining_seconds.map(|r| now + r.max(0.0)));
            let remaining_secs = end.map_or(0.0, |end| remaining(end, now));
            let progress = match (task.start_timestamp, end) {
                (Some(start), Some(end)) => progress(start, end, now),
                _ => 0.0,
            };
            let mut entities: Vec<String> = Vec::new();
            for entity in task
                .start_actions
                .iter()
                .chain(&task.finish_actions)
                .filter_map(|a| a.entity.as_deref())
            {
                if !entities.iter().any(|e| e == entity) {
                    entities.push(entity.to_owned());
                }
            }
            OverviewEntry {
                key: key.clone(),
                label: task
                    .label
                    .clone()
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| key.clone()),
                remaining_secs,
                progress,
                entities,
            }
        })
        .collect();
    entries.sort_by(|a, b| {
        a.remaining_secs
            .partial_cmp(&b.remaining_secs)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    entries
}

/// Overview surface: read-only list plus cancel.
#[derive(Debug)]
pub struct OverviewSurface {
    client: SchedulingClient,
    entries: Vec<OverviewEntry>,
    error: Option<InlineError>,
    error_ttl_secs: u64,
}

impl OverviewSurface {
    pub fn new(client: SchedulingClient, error_ttl_secs: u64) -> Self {
        Self {
            client,
            entries: Vec::new(),
            error: None,
            error_ttl_secs,
        }
    }

    pub fn refresh(&mut self, snapshot: &MonitorSnapshot, now: f64) -> &[OverviewEntry] {
        self.entries = overview_entries(snapshot, now);
        expire_inline_error(&mut self.error, now, self.error_ttl_secs);
        &self.entries
    }

    #[must_use]
    pub fn entries(&self) -> &[OverviewEntry] {
        &self.entries
    }

    #[must_use]
    pub fn error(&self) -> Option<&InlineError> {
        self.error.as_ref()
    }

    /// Cancel by snapshot key. The entry stays listed until a snapshot
    /// drops it.
    pub async fn cancel(&mut self, key: &str, now: f64) -> Result<()> {
        if let Err(e) = self.client.cancel(key).await {
            warn!(task_id = key, error = %e, "overview cancel failed");
            self.error = Some(InlineError::new(e.to_string(), now));
            return Err(e);
        }
        self.error = None;
        Ok(())
    }
}
