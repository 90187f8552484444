//! Locating the host's entity-detail container and its subject.
//!
//! Strategies run in a fixed order and the first one that yields both a
//! container node and a subject entity wins. Discovery misses are expected
//! while the host is still rendering; callers retry rather than fail.

use crate::binding::panel::PANEL_TAG;
use crate::binding::tree::{HostTree, NodeId};
use crate::config::BindingConfig;
use std::collections::VecDeque;

/// Levels searched below a dialog for its content container.
const DIALOG_CONTENT_DEPTH: usize = 4;

/// Where to inject, and for which entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub container: NodeId,
    pub subject: String,
    /// Name of the strategy that found it.
    pub strategy: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Found(Attachment),
    Miss,
}

/// One way of finding the container and subject.
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn locate(&self, tree: &dyn HostTree) -> Option<(NodeId, String)>;
}

fn non_empty_attribute(tree: &dyn HostTree, node: NodeId, name: &str) -> Option<String> {
    tree.attribute(node, name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn is_panel(tree: &dyn HostTree, node: NodeId) -> bool {
    tree.tag(node).as_deref() == Some(PANEL_TAG)
}

/// Breadth-first walk below `start` to `max_depth` levels, skipping panels.
fn bounded_bfs(tree: &dyn HostTree, start: NodeId, max_depth: usize) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut queue = VecDeque::from([(start, 0usize)]);
    while let Some((node, depth)) = queue.pop_front() {
        order.push(node);
        if depth >= max_depth {
            continue;
        }
        for child in tree.children(node) {
            if !is_panel(tree, child) {
                queue.push_back((child, depth + 1));
            }
        }
    }
    order
}

/// Follow a fixed tag path from the root.
#[derive(Debug, Clone)]
pub struct DirectPath {
    pub path: Vec<String>,
    pub subject_attribute: String,
}

impl DiscoveryStrategy for DirectPath {
    fn name(&self) -> &'static str {
        "direct_path"
    }

    fn locate(&self, tree: &dyn HostTree) -> Option<(NodeId, String)> {
        if self.path.is_empty() {
            return None;
        }
        let mut node = tree.root()?;
        let mut subject = non_empty_attribute(tree, node, &self.subject_attribute);
        for step in &self.path {
            node = tree
                .children(node)
                .into_iter()
                .find(|child| tree.tag(*child).as_deref() == Some(step.as_str()))?;
            if let Some(found) = non_empty_attribute(tree, node, &self.subject_attribute) {
                subject = Some(found);
            }
        }
        subject.map(|subject| (node, subject))
    }
}

/// Find a dialog carrying the subject, then its content container.
#[derive(Debug, Clone)]
pub struct DialogHeuristic {
    pub dialog_tag: String,
    pub subject_attribute: String,
    pub content_tags: Vec<String>,
    pub max_depth: usize,
}

impl DiscoveryStrategy for DialogHeuristic {
    fn name(&self) -> &'static str {
        "dialog_heuristic"
    }

    fn locate(&self, tree: &dyn HostTree) -> Option<(NodeId, String)> {
        let root = tree.root()?;
        bounded_bfs(tree, root, self.max_depth)
            .into_iter()
            .filter(|node| tree.tag(*node).as_deref() == Some(self.dialog_tag.as_str()))
            .find_map(|dialog| {
                let subject = non_empty_attribute(tree, dialog, &self.subject_attribute)?;
                let container = bounded_bfs(tree, dialog, DIALOG_CONTENT_DEPTH)
                    .into_iter()
                    .skip(1)
                    .find(|node| {
                        tree.tag(*node)
                            .is_some_and(|tag| self.content_tags.iter().any(|t| *t == tag))
                    })?;
                Some((container, subject))
            })
    }
}

/// Depth-bounded search for any content container with a subject on an
/// ancestor.
#[derive(Debug, Clone)]
pub struct BoundedSearch {
    pub subject_attribute: String,
    pub content_tags: Vec<String>,
    pub max_depth: usize,
}

impl DiscoveryStrategy for BoundedSearch {
    fn name(&self) -> &'static str {
        "bounded_search"
    }

    fn locate(&self, tree: &dyn HostTree) -> Option<(NodeId, String)> {
        let root = tree.root()?;
        bounded_bfs(tree, root, self.max_depth)
            .into_iter()
            .filter(|node| {
                tree.tag(*node)
                    .is_some_and(|tag| self.content_tags.iter().any(|t| *t == tag))
            })
            .find_map(|container| {
                let mut current = Some(container);
                while let Some(node) = current {
                    if let Some(subject) = non_empty_attribute(tree, node, &self.subject_attribute) {
                        return Some((container, subject));
                    }
                    current = tree.parent(node);
                }
                None
            })
    }
}

/// Ordered set of strategies.
pub struct Discovery {
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("Discovery").field("strategies", &names).finish()
    }
}

impl Discovery {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn DiscoveryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Direct path, then dialog heuristic, then bounded search.
    #[must_use]
    pub fn from_config(config: &BindingConfig) -> Self {
        Self::new(vec![
            Box::new(DirectPath {
                path: config.direct_path.clone(),
                subject_attribute: config.subject_attribute.clone(),
            }),
            Box::new(DialogHeuristic {
                dialog_tag: config.dialog_tag.clone(),
                subject_attribute: config.subject_attribute.clone(),
                content_tags: config.content_tags.clone(),
                max_depth: config.search_depth,
            }),
            Box::new(BoundedSearch {
                subject_attribute: config.subject_attribute.clone(),
                content_tags: config.content_tags.clone(),
                max_depth: config.search_depth,
            }),
        ])
    }

    pub fn discover(&self, tree: &dyn HostTree) -> DiscoveryOutcome {
        for strategy in &self.strategies {
            if let Some((container, subject)) = strategy.locate(tree) {
                return DiscoveryOutcome::Found(Attachment {
                    container,
                    subject,
                    strategy: strategy.name(),
                });
            }
            tracing::trace!(strategy = strategy.name(), "discovery strategy missed");
        }
        DiscoveryOutcome::Miss
    }
}
