//! Abstract view of the host's element tree.
//!
//! Discovery and panel injection only go through [`HostTree`], so any
//! toolkit can be plugged in. [`MemoryTree`] is an arena implementation used
//! by the bridge and by tests; [`SharedTree`] lets a host and a binding loop
//! mutate the same tree.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Opaque handle to a node. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Read and write access to the host's element tree.
pub trait HostTree {
    fn root(&self) -> Option<NodeId>;
    /// Children in document order; empty for unknown nodes.
    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    /// Element tag; `None` once the node no longer exists.
    fn tag(&self, node: NodeId) -> Option<String>;
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;
    /// Whether `node` is still reachable from the root.
    fn is_attached(&self, node: NodeId) -> bool;
    /// Create an element as the last child of `parent`.
    fn append_element(&mut self, parent: NodeId, tag: &str) -> Option<NodeId>;
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);
    /// Detach and drop `node` with its subtree.
    fn remove(&mut self, node: NodeId);
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

/// Arena-backed tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    nodes: HashMap<NodeId, NodeData>,
    root: Option<NodeId>,
    next_id: u64,
}

impl MemoryTree {
    /// A tree with a single root element.
    pub fn new(root_tag: &str) -> Self {
        let mut tree = Self::default();
        let root = tree.alloc(root_tag, None);
        tree.root = Some(root);
        tree
    }

    fn alloc(&mut self, tag: &str, parent: Option<NodeId>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            NodeData {
                tag: tag.to_owned(),
                attributes: BTreeMap::new(),
                children: Vec::new(),
                parent,
            },
        );
        id
    }

    /// Append an element with attributes; `None` when `parent` is unknown.
    pub fn add(&mut self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> Option<NodeId> {
        let node = self.append_element(parent, tag)?;
        for (name, value) in attributes {
            self.set_attribute(node, name, value);
        }
        Some(node)
    }

    /// Every attached node with `tag`, in document order.
    #[must_use]
    pub fn find_all(&self, tag: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(node) = stack.pop() {
            let Some(data) = self.nodes.get(&node) else {
                continue;
            };
            if data.tag == tag {
                found.push(node);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        found
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl HostTree for MemoryTree {
    fn root(&self) -> Option<NodeId> {
        self.root
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|data| data.parent)
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.nodes.get(&node).map(|data| data.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.nodes
            .get(&node)
            .and_then(|data| data.attributes.get(name).cloned())
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if Some(id) == self.root {
                return true;
            }
            current = self.nodes.get(&id).and_then(|data| data.parent);
        }
        false
    }

    fn append_element(&mut self, parent: NodeId, tag: &str) -> Option<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return None;
        }
        let node = self.alloc(tag, Some(parent));
        if let Some(data) = self.nodes.get_mut(&parent) {
            data.children.push(node);
        }
        Some(node)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(data) = self.nodes.get_mut(&node) {
            data.attributes.insert(name.to_owned(), value.to_owned());
        }
    }

    fn remove(&mut self, node: NodeId) {
        let Some(data) = self.nodes.get(&node) else {
            return;
        };
        if let Some(parent) = data.parent {
            if let Some(parent_data) = self.nodes.get_mut(&parent) {
                parent_data.children.retain(|child| *child != node);
            }
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(removed) = self.nodes.remove(&id) {
                stack.extend(removed.children);
            }
        }
        if self.root == Some(node) {
            self.root = None;
        }
    }
}

/// A [`MemoryTree`] shared between the host and a binding loop.
#[derive(Debug, Clone, Default)]
pub struct SharedTree(Arc<Mutex<MemoryTree>>);

impl SharedTree {
    pub fn new(tree: MemoryTree) -> Self {
        Self(Arc::new(Mutex::new(tree)))
    }

    pub fn lock(&self) -> MutexGuard<'_, MemoryTree> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostTree for SharedTree {
    fn root(&self) -> Option<NodeId> {
        self.lock().root()
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.lock().children(node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.lock().parent(node)
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.lock().tag(node)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.lock().attribute(node, name)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.lock().is_attached(node)
    }

    fn append_element(&mut self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.lock().append_element(parent, tag)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.lock().set_attribute(node, name, value);
    }

    fn remove(&mut self, node: NodeId) {
        self.lock().remove(node);
    }
}
