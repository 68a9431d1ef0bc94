//! The resource hierarchy: a named, singly-parented, multi-child tree.
//!
//! Nodes live in an arena owned by the [`Tree`]; parent and child links are
//! indices, so the parent link never owns anything and a node can never
//! become its own ancestor. Children are append-only. Reading goes through
//! the borrowed [`NodeRef`] view.

mod transform;
mod traverse;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RateTreeError, Result};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a node within one specific tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    tree: u64,
    index: usize,
}

#[derive(Debug)]
struct NodeData<V> {
    name: String,
    value: Option<V>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// An arena of nodes rooted at index 0.
#[derive(Debug)]
pub struct Tree<V> {
    id: u64,
    nodes: Vec<NodeData<V>>,
}

impl<V> Tree<V> {
    /// Create a tree holding only its root.
    pub fn new(root_name: impl Into<String>, root_value: Option<V>) -> Self {
        Self {
            id: NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed),
            nodes: vec![NodeData {
                name: root_name.into(),
                value: root_value,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        self.id_of(0)
    }

    pub fn root_node(&self) -> NodeRef<'_, V> {
        NodeRef { tree: self, index: 0 }
    }

    /// Append a child named `name` under `parent`.
    ///
    /// Fails if `parent` belongs to another tree or already has a child
    /// with the same name.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>, value: Option<V>) -> Result<NodeId> {
        let parent_index = self.index_of(parent)?;
        let name = name.into();

        if self.nodes[parent_index]
            .children
            .iter()
            .any(|&child| self.nodes[child].name == name)
        {
            return Err(RateTreeError::Structure(format!(
                "node '{}' already has a child named '{}'",
                self.nodes[parent_index].name, name
            )));
        }

        let index = self.push_child(parent_index, name, value);
        Ok(self.id_of(index))
    }

    /// Append without the sibling-name check; callers guarantee uniqueness.
    fn push_child(&mut self, parent_index: usize, name: String, value: Option<V>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(NodeData {
            name,
            value,
            parent: Some(parent_index),
            children: Vec::new(),
        });
        self.nodes[parent_index].children.push(index);
        index
    }

    /// Look up a node; `None` if the id belongs to another tree.
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_, V>> {
        self.index_of(id).ok().map(|index| NodeRef { tree: self, index })
    }

    /// Like [`get`](Self::get), but a foreign id is a structural error.
    pub fn node(&self, id: NodeId) -> Result<NodeRef<'_, V>> {
        let index = self.index_of(id)?;
        Ok(NodeRef { tree: self, index })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Every node without children, in depth-first encounter order.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        self.root_node().visit_all(
            |node| node.is_leaf(),
            |node| leaves.push(node.id()),
            usize::MAX,
        );
        leaves
    }

    fn id_of(&self, index: usize) -> NodeId {
        NodeId { tree: self.id, index }
    }

    fn index_of(&self, id: NodeId) -> Result<usize> {
        if id.tree != self.id || id.index >= self.nodes.len() {
            return Err(RateTreeError::Structure(format!(
                "node id {:?} does not belong to this tree",
                id
            )));
        }
        Ok(id.index)
    }
}

/// Trees are equal when they have the same shape, names and values.
impl<V: PartialEq> PartialEq for Tree<V> {
    fn eq(&self, other: &Self) -> bool {
        fn same_subtree<V: PartialEq>(a: NodeRef<'_, V>, b: NodeRef<'_, V>) -> bool {
            a.name() == b.name()
                && a.value() == b.value()
                && a.child_count() == b.child_count()
                && a.children().zip(b.children()).all(|(x, y)| same_subtree(x, y))
        }
        same_subtree(self.root_node(), other.root_node())
    }
}

/// Borrowed view of one node.
pub struct NodeRef<'a, V> {
    tree: &'a Tree<V>,
    index: usize,
}

impl<'a, V> Clone for NodeRef<'a, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, V> Copy for NodeRef<'a, V> {}

impl<'a, V> NodeRef<'a, V> {
    fn data(&self) -> &'a NodeData<V> {
        &self.tree.nodes[self.index]
    }

    fn at(&self, index: usize) -> NodeRef<'a, V> {
        NodeRef { tree: self.tree, index }
    }

    pub fn id(&self) -> NodeId {
        self.tree.id_of(self.index)
    }

    pub fn tree(&self) -> &'a Tree<V> {
        self.tree
    }

    pub fn name(&self) -> &'a str {
        &self.data().name
    }

    pub fn value(&self) -> Option<&'a V> {
        self.data().value.as_ref()
    }

    pub fn parent(&self) -> Option<NodeRef<'a, V>> {
        self.data().parent.map(|index| self.at(index))
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = NodeRef<'a, V>> + 'a {
        let tree = self.tree;
        self.data()
            .children
            .iter()
            .map(move |&index| NodeRef { tree, index })
    }

    pub fn child_count(&self) -> usize {
        self.data().children.len()
    }

    pub fn is_root(&self) -> bool {
        self.data().parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.data().children.is_empty()
    }

    /// Distance from the root; the root is level 0.
    pub fn level(&self) -> usize {
        self.ancestors().count()
    }

    /// Parent, grandparent, and so on up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'a, V>> {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    pub fn root(&self) -> NodeRef<'a, V> {
        self.at(0)
    }

    /// Names from the root's first child down to this node, joined by `separator`.
    ///
    /// The root contributes nothing, so the root's path is empty.
    pub fn path(&self, separator: &str) -> String {
        let mut names: Vec<&str> = std::iter::once(*self)
            .chain(self.ancestors())
            .filter(|node| !node.is_root())
            .map(|node| node.name())
            .collect();
        names.reverse();
        names.join(separator)
    }
}

/// Equality over name, value and the parent chain; children are ignored.
impl<'a, V: PartialEq> PartialEq for NodeRef<'a, V> {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.value() == other.value()
            && match (self.parent(), other.parent()) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
    }
}

impl<'a, V: Eq> Eq for NodeRef<'a, V> {}

impl<'a, V: Hash> Hash for NodeRef<'a, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for node in std::iter::once(*self).chain(self.ancestors()) {
            node.name().hash(state);
            node.value().hash(state);
        }
    }
}

impl<'a, V: fmt::Debug> fmt::Debug for NodeRef<'a, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("level", &self.level())
            .field("value", &self.value())
            .field("children", &self.child_count())
            .finish()
    }
}

impl<'a, V> fmt::Display for NodeRef<'a, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
