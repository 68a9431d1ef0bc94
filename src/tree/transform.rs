//! Building new trees out of existing ones.
//!
//! Nothing here mutates the source tree.

use super::{NodeId, NodeRef, Tree};
use crate::error::Result;

impl<'a, V> NodeRef<'a, V> {
    /// Copy this subtree into a new tree, mapping every name and value.
    ///
    /// Fails if `name_fn` maps two siblings to the same name.
    pub fn transform<U, N, F>(&self, mut name_fn: N, mut value_fn: F) -> Result<Tree<U>>
    where
        N: FnMut(NodeRef<'a, V>) -> String,
        F: FnMut(NodeRef<'a, V>) -> Option<U>,
    {
        let mut target = Tree::new(name_fn(*self), value_fn(*self));
        let root = target.root();
        for child in self.children() {
            child.transform_under(&mut target, root, &mut name_fn, &mut value_fn)?;
        }
        Ok(target)
    }

    /// Copy this subtree under `parent` in an existing tree.
    ///
    /// Returns the id of the copied subtree's root in `target`.
    pub fn transform_into<U, N, F>(
        &self,
        target: &mut Tree<U>,
        parent: NodeId,
        mut name_fn: N,
        mut value_fn: F,
    ) -> Result<NodeId>
    where
        N: FnMut(NodeRef<'a, V>) -> String,
        F: FnMut(NodeRef<'a, V>) -> Option<U>,
    {
        self.transform_under(target, parent, &mut name_fn, &mut value_fn)
    }

    fn transform_under<U, N, F>(
        &self,
        target: &mut Tree<U>,
        parent: NodeId,
        name_fn: &mut N,
        value_fn: &mut F,
    ) -> Result<NodeId>
    where
        N: FnMut(NodeRef<'a, V>) -> String,
        F: FnMut(NodeRef<'a, V>) -> Option<U>,
    {
        let id = target.add_child(parent, name_fn(*self), value_fn(*self))?;
        for child in self.children() {
            child.transform_under(target, id, name_fn, value_fn)?;
        }
        Ok(id)
    }

    /// Copy this subtree with names and values unchanged.
    pub fn copy(&self) -> Tree<V>
    where
        V: Clone,
    {
        let mut target = Tree::new(self.name().to_string(), self.value().cloned());
        let mut pending: Vec<(NodeRef<'a, V>, usize)> = self.children().map(|c| (c, 0)).collect();
        pending.reverse();
        while let Some((node, parent)) = pending.pop() {
            // Source siblings already have distinct names
            let index = target.push_child(parent, node.name().to_string(), node.value().cloned());
            let children: Vec<_> = node.children().collect();
            pending.extend(children.into_iter().rev().map(|c| (c, index)));
        }
        target
    }

    /// Rebuild this subtree keeping only the nodes accepted by `predicate`.
    ///
    /// This node is always kept. A rejected node takes its rejected
    /// descendants with it; accepted descendants are re-attached to the
    /// nearest kept ancestor. Fails if re-attachment puts two nodes with the
    /// same name under one parent.
    pub fn filter<P>(&self, mut predicate: P) -> Result<Tree<V>>
    where
        V: Clone,
        P: FnMut(NodeRef<'a, V>) -> bool,
    {
        let mut target = Tree::new(self.name().to_string(), self.value().cloned());
        let root = target.root();
        for child in self.children() {
            child.filter_under(&mut target, root, &mut predicate)?;
        }
        Ok(target)
    }

    fn filter_under<P>(&self, target: &mut Tree<V>, kept_ancestor: NodeId, predicate: &mut P) -> Result<()>
    where
        V: Clone,
        P: FnMut(NodeRef<'a, V>) -> bool,
    {
        let parent = if predicate(*self) {
            target.add_child(kept_ancestor, self.name().to_string(), self.value().cloned())?
        } else {
            kept_ancestor
        };
        for child in self.children() {
            child.filter_under(target, parent, predicate)?;
        }
        Ok(())
    }
}

impl<V: Clone> Tree<V> {
    /// A structurally identical, independent copy.
    pub fn copy(&self) -> Tree<V> {
        self.root_node().copy()
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::tests::sample_tree;
    use crate::tree::Tree;

    #[test]
    fn test_identity_transform_round_trips() {
        let tree = sample_tree();
        let copied = tree
            .root_node()
            .transform(|n| n.name().to_string(), |n| n.value().copied())
            .unwrap();
        assert_eq!(tree, copied);
        assert_eq!(tree, tree.copy());
    }

    #[test]
    fn test_transform_maps_names_and_values() {
        let tree = sample_tree();
        let mapped: Tree<String> = tree
            .root_node()
            .transform(|n| n.name().to_uppercase(), |n| n.value().map(|v| format!("v{}", v)))
            .unwrap();

        let a2 = mapped.root_node().find_by_name("A2").unwrap();
        assert_eq!(a2.value().map(String::as_str), Some("v12"));
        assert_eq!(a2.parent().unwrap().name(), "A");
        assert_eq!(mapped.len(), tree.len());
    }

    #[test]
    fn test_transform_rejects_merged_siblings() {
        let tree = sample_tree();
        let merged: crate::error::Result<Tree<u32>> = tree
            .root_node()
            .transform(|n| if n.is_root() { "root".into() } else { "same".into() }, |n| n.value().copied());
        assert!(merged.is_err());
    }

    #[test]
    fn test_subtree_copy_preserves_order() {
        let tree = sample_tree();
        let a = tree.root_node().find_by_name("a").unwrap();
        let copied = a.copy();

        assert_eq!(copied.root_node().name(), "a");
        let names: Vec<&str> = copied.root_node().children().map(|n| n.name()).collect();
        assert_eq!(names, vec!["a1", "a2"]);
    }

    #[test]
    fn test_transform_into_existing_parent() {
        let source = sample_tree();
        let mut target: Tree<u32> = Tree::new("top", None);
        let top = target.root();

        let a = source.root_node().find_by_name("a").unwrap();
        let copied = a
            .transform_into(&mut target, top, |n| n.name().to_string(), |n| n.value().copied())
            .unwrap();
        assert_eq!(target.node(copied).unwrap().path("."), "a");
        assert_eq!(target.len(), 4);

        // A second copy under the same parent collides by name
        let again = a.transform_into(&mut target, top, |n| n.name().to_string(), |n| n.value().copied());
        assert!(again.is_err());
    }

    #[test]
    fn test_filter_reattaches_matching_descendants() {
        let tree = sample_tree();
        // Drop "a" but keep its children
        let filtered = tree.root_node().filter(|n| n.name() != "a").unwrap();

        let root = filtered.root_node();
        let names: Vec<&str> = root.children().map(|n| n.name()).collect();
        assert_eq!(names, vec!["a1", "a2", "b"]);
        assert_eq!(root.find_by_name("a1").unwrap().level(), 1);
    }

    #[test]
    fn test_filter_prunes_unmatched_descendants() {
        let tree = sample_tree();
        let filtered = tree.root_node().filter(|n| n.value() == Some(&12)).unwrap();

        let names: Vec<&str> = filtered.root_node().children().map(|n| n.name()).collect();
        assert_eq!(names, vec!["a2"]);
        assert_eq!(filtered.len(), 2);
    }
}
