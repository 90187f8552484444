//! The panel injected into the host's detail view.

use crate::binding::tree::{HostTree, NodeId};
use crate::countdown::{
    CountdownView, IntervalHandle, SurfaceTracker, format_progress, format_remaining,
};
use crate::form::ScheduleForm;
use crate::resolver::SurfaceIdentity;
use crate::snapshot::MonitorSnapshot;
use crate::surface::{InlineError, expire_inline_error};

/// Tag of every injected panel element.
pub const PANEL_TAG: &str = "quick-timer-panel";

/// Attribute naming the entity a panel is bound to.
pub const PANEL_SUBJECT_ATTR: &str = "data-entity";

/// Every panel element in the tree, in document order.
#[must_use]
pub fn find_panels(tree: &dyn HostTree) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut stack: Vec<NodeId> = tree.root().into_iter().collect();
    while let Some(node) = stack.pop() {
        if tree.tag(node).as_deref() == Some(PANEL_TAG) {
            found.push(node);
        }
        stack.extend(tree.children(node).into_iter().rev());
    }
    found
}

/// A panel attached to one host container for one subject entity.
///
/// Owns exactly one recompute interval. [`BoundPanel::teardown`] is the only
/// way to discard a panel and always cancels that interval before the
/// element leaves the tree.
#[derive(Debug)]
pub struct BoundPanel {
    node: NodeId,
    container: NodeId,
    subject: String,
    identity: SurfaceIdentity,
    tracker: SurfaceTracker,
    view: CountdownView,
    interval: IntervalHandle,
    pub(crate) form: ScheduleForm,
    pub(crate) error: Option<InlineError>,
}

impl BoundPanel {
    /// Create the panel element under `container`. `None` when the container
    /// vanished in the meantime; the interval is then dropped and cancelled.
    pub fn inject(
        tree: &mut dyn HostTree,
        container: NodeId,
        subject: &str,
        form: ScheduleForm,
        interval: IntervalHandle,
    ) -> Option<Self> {
        let node = tree.append_element(container, PANEL_TAG)?;
        tree.set_attribute(node, PANEL_SUBJECT_ATTR, subject);
        let panel = Self {
            node,
            container,
            subject: subject.to_owned(),
            identity: SurfaceIdentity::for_entity(subject),
            tracker: SurfaceTracker::new(),
            view: CountdownView::default(),
            interval,
            form,
            error: None,
        };
        panel.render(tree);
        Some(panel)
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn container(&self) -> NodeId {
        self.container
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn identity(&self) -> &SurfaceIdentity {
        &self.identity
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

    /// Whether this panel is still in the tree at `container` for `subject`.
    #[must_use]
    pub fn is_bound_to(&self, tree: &dyn HostTree, container: NodeId, subject: &str) -> bool {
        self.container == container
            && self.subject == subject
            && tree.parent(self.node) == Some(container)
            && tree.is_attached(self.node)
    }

    /// Recompute the countdown and write it onto the element.
    pub fn refresh(
        &mut self,
        tree: &mut dyn HostTree,
        snapshot: &MonitorSnapshot,
        now: f64,
        error_ttl_secs: u64,
    ) -> &CountdownView {
        self.view = self.tracker.tick(&self.identity, snapshot, now);
        expire_inline_error(&mut self.error, now, error_ttl_secs);
        self.render(tree);
        &self.view
    }

    fn render(&self, tree: &mut dyn HostTree) {
        let remaining = if self.view.is_scheduled() {
            Some(self.view.remaining_secs)
        } else {
            None
        };
        tree.set_attribute(self.node, "data-state", self.view.state.as_str());
        tree.set_attribute(self.node, "data-remaining", &format_remaining(remaining));
        tree.set_attribute(self.node, "data-progress", &format_progress(self.view.progress));
        tree.set_attribute(
            self.node,
            "data-controls",
            if self.view.controls_visible() { "visible" } else { "hidden" },
        );
        let message = self.error.as_ref().map_or("", |e| e.message.as_str());
        tree.set_attribute(self.node, "data-error", message);
    }

    /// Cancel the interval, then remove the element.
    pub fn teardown(mut self, tree: &mut dyn HostTree) {
        self.interval.cancel();
        tree.remove(self.node);
        tracing::debug!(subject = %self.subject, "panel torn down");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::binding::tree::MemoryTree;
    use crate::form::FormDefaults;
    use crate::preferences::Preferences;
    use crate::snapshot::TaskSnapshot;
    use tokio_util::sync::CancellationToken;

    fn form() -> ScheduleForm {
        ScheduleForm::from_preferences(&Preferences::default(), &FormDefaults::default())
    }

    #[test]
    fn inject_refresh_and_teardown() {
        let mut tree = MemoryTree::new("body");
        let root = tree.root().unwrap();
        let container = tree.add(root, "content", &[]).unwrap();
        let token = CancellationToken::new();
        let mut panel = BoundPanel::inject(
            &mut tree,
            container,
            "light.hall",
            form(),
            IntervalHandle::detached(token.clone()),
        )
        .unwrap();
        assert!(panel.is_bound_to(&tree, container, "light.hall"));
        assert_eq!(tree.attribute(panel.node(), PANEL_SUBJECT_ATTR).as_deref(), Some("light.hall"));
        assert_eq!(tree.attribute(panel.node(), "data-state").as_deref(), Some("idle"));

        let mut snapshot = MonitorSnapshot::default();
        snapshot.tasks.insert(
            "light.hall".to_owned(),
            TaskSnapshot {
                id: "light.hall".to_owned(),
                start_timestamp: Some(1000.0),
                end_timestamp: Some(1100.0),
                ..TaskSnapshot::default()
            },
        );
        let view = panel.refresh(&mut tree, &snapshot, 1025.0, 5).clone();
        assert!(view.is_scheduled());
        assert_eq!(tree.attribute(panel.node(), "data-remaining").as_deref(), Some("1:15"));
        assert_eq!(tree.attribute(panel.node(), "data-progress").as_deref(), Some("25%"));
        assert_eq!(tree.attribute(panel.node(), "data-controls").as_deref(), Some("hidden"));

        let node = panel.node();
        panel.teardown(&mut tree);
        assert!(token.is_cancelled());
        assert!(!tree.is_attached(node));
    }

    #[test]
    fn inject_into_missing_container_cancels_interval() {
        let mut tree = MemoryTree::new("body");
        let token = CancellationToken::new();
        let panel = BoundPanel::inject(
            &mut tree,
            NodeId(404),
            "light.hall",
            form(),
            IntervalHandle::detached(token.clone()),
        );
        assert!(panel.is_none());
        assert!(token.is_cancelled());
    }
}
