//! Card, tile and overview surfaces.
//!
//! Surfaces are presentation state only. They compose requests, hand them
//! to the [`SchedulingClient`](crate::client::SchedulingClient) and wait for
//! the next snapshot to reflect the outcome.

pub mod card;
pub mod overview;

pub use card::CardSurface;
pub use overview::{OverviewEntry, OverviewSurface, overview_entries};

use crate::client::ScheduleRequest;
use crate::composer;
use crate::error::Result;
use crate::form::ScheduleForm;

/// Transient error shown next to the control that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineError {
    pub message: String,
    /// Epoch seconds.
    pub raised_at: f64,
}

impl InlineError {
    pub fn new(message: impl Into<String>, raised_at: f64) -> Self {
        Self {
            message: message.into(),
            raised_at,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: f64, ttl_secs: u64) -> bool {
        now - self.raised_at >= ttl_secs as f64
    }
}

/// Drop `slot`'s error once it is older than `ttl_secs`.
pub(crate) fn expire_inline_error(slot: &mut Option<InlineError>, now: f64, ttl_secs: u64) {
    if slot.as_ref().is_some_and(|e| e.is_expired(now, ttl_secs)) {
        *slot = None;
    }
}

/// Request for a single-entity surface driven by `form`.
pub(crate) fn entity_request(
    task_id: &str,
    entity: &str,
    form: &ScheduleForm,
    label: Option<String>,
) -> Result<ScheduleRequest> {
    let actions = composer::compose(&form.targets_for(entity)?);
    let parameters = form.bound_parameters(entity)?;
    Ok(ScheduleRequest::new(task_id, actions, form.timing.clone())
        .with_label(label)
        .with_notifications(form.notifications.clone())
        .with_command(Some(form.command_for(entity).to_owned()), parameters))
}
