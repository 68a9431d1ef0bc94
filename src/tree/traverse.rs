//! Traversal and search over a subtree.

use std::collections::VecDeque;

use super::NodeRef;

impl<'a, V> NodeRef<'a, V> {
    /// Depth-first pre-order walk of this subtree.
    ///
    /// `filter` decides whether `consumer` sees a node; it does not stop the
    /// walk from descending. `max_depth` bounds the descent: 0 visits only
    /// this node.
    pub fn visit_all<F, C>(&self, mut filter: F, mut consumer: C, max_depth: usize)
    where
        F: FnMut(NodeRef<'a, V>) -> bool,
        C: FnMut(NodeRef<'a, V>),
    {
        let mut stack = vec![(*self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if filter(node) {
                consumer(node);
            }
            if depth < max_depth {
                // Reverse so the first child is popped first
                let children: Vec<_> = node.children().collect();
                for child in children.into_iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
    }

    /// Breadth-first walk with the same filter and depth semantics as
    /// [`visit_all`](Self::visit_all).
    pub fn visit_all_breadth_first<F, C>(&self, mut filter: F, mut consumer: C, max_depth: usize)
    where
        F: FnMut(NodeRef<'a, V>) -> bool,
        C: FnMut(NodeRef<'a, V>),
    {
        let mut queue = VecDeque::from([(*self, 0usize)]);
        while let Some((node, depth)) = queue.pop_front() {
            if filter(node) {
                consumer(node);
            }
            if depth < max_depth {
                queue.extend(node.children().map(|child| (child, depth + 1)));
            }
        }
    }

    /// First node of this subtree, this node included, matching `predicate`
    /// in depth-first order.
    pub fn find_first<P>(&self, mut predicate: P) -> Option<NodeRef<'a, V>>
    where
        P: FnMut(NodeRef<'a, V>) -> bool,
    {
        let mut stack = vec![*self];
        while let Some(node) = stack.pop() {
            if predicate(node) {
                return Some(node);
            }
            let children: Vec<_> = node.children().collect();
            stack.extend(children.into_iter().rev());
        }
        None
    }

    /// First node named `name` in this subtree.
    pub fn find_by_name(&self, name: &str) -> Option<NodeRef<'a, V>> {
        self.find_first(|node| node.name() == name)
    }

    /// Follow a path of values: the first element is searched from this node
    /// (inclusive), each later one among the descendants of the previous match.
    pub fn find_first_by_values(&self, values: &[V]) -> Option<NodeRef<'a, V>>
    where
        V: PartialEq,
    {
        let (first, rest) = values.split_first()?;
        let mut current = self.find_first(|node| node.value() == Some(first))?;
        for value in rest {
            current = current
                .children()
                .find_map(|child| child.find_first(|node| node.value() == Some(value)))?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::tests::sample_tree;

    fn names<'a>(nodes: &[crate::tree::NodeRef<'a, u32>]) -> Vec<&'a str> {
        nodes.iter().map(|n| n.name()).collect()
    }

    #[test]
    fn test_depth_first_pre_order() {
        let tree = sample_tree();
        let mut seen = Vec::new();
        tree.root_node().visit_all(|_| true, |n| seen.push(n), usize::MAX);
        assert_eq!(names(&seen), vec!["root", "a", "a1", "a2", "b"]);
    }

    #[test]
    fn test_breadth_first_order() {
        let tree = sample_tree();
        let mut seen = Vec::new();
        tree.root_node()
            .visit_all_breadth_first(|_| true, |n| seen.push(n), usize::MAX);
        assert_eq!(names(&seen), vec!["root", "a", "b", "a1", "a2"]);
    }

    #[test]
    fn test_both_orders_visit_every_node_once() {
        let tree = sample_tree();
        let mut depth_first = Vec::new();
        let mut breadth_first = Vec::new();
        tree.root_node()
            .visit_all(|_| true, |n| depth_first.push(n.id()), usize::MAX);
        tree.root_node()
            .visit_all_breadth_first(|_| true, |n| breadth_first.push(n.id()), usize::MAX);

        assert_eq!(depth_first.len(), tree.len());
        depth_first.sort();
        breadth_first.sort();
        depth_first.dedup();
        assert_eq!(depth_first.len(), tree.len());
        assert_eq!(depth_first, breadth_first);
    }

    #[test]
    fn test_depth_limit() {
        let tree = sample_tree();
        let mut seen = Vec::new();
        tree.root_node().visit_all(|_| true, |n| seen.push(n), 0);
        assert_eq!(names(&seen), vec!["root"]);

        let mut seen = Vec::new();
        tree.root_node()
            .visit_all_breadth_first(|_| true, |n| seen.push(n), 1);
        assert_eq!(names(&seen), vec!["root", "a", "b"]);
    }

    #[test]
    fn test_filter_does_not_prune_descent() {
        let tree = sample_tree();
        let mut seen = Vec::new();
        tree.root_node()
            .visit_all(|n| n.value().is_some_and(|v| *v > 10), |n| seen.push(n), usize::MAX);
        assert_eq!(names(&seen), vec!["a1", "a2"]);
    }

    #[test]
    fn test_find_first() {
        let tree = sample_tree();
        let root = tree.root_node();

        assert_eq!(root.find_first(|n| n.is_root()).unwrap().name(), "root");
        assert_eq!(root.find_first(|n| n.value() == Some(&12)).unwrap().name(), "a2");
        assert!(root.find_first(|n| n.value() == Some(&99)).is_none());
        assert_eq!(root.find_by_name("b").unwrap().level(), 1);
    }

    #[test]
    fn test_find_first_by_values() {
        let tree = sample_tree();
        let root = tree.root_node();

        assert_eq!(root.find_first_by_values(&[1, 12]).unwrap().name(), "a2");
        // 2 is found, but 12 is not below it
        assert!(root.find_first_by_values(&[2, 12]).is_none());
        assert!(root.find_first_by_values(&[]).is_none());
        // A repeated value must be found strictly below the previous match
        assert!(root.find_first_by_values(&[1, 1]).is_none());
    }
}
