//! Ordered traversal over one tree snapshot.
//!
//! All three iterators share [`LeafCursor`], which stands in for the
//! tree-wide leaf chain. The cursor sits on one leaf and remembers the path of
//! `(node, edge index)` pairs that leads to it, so stepping to the next or
//! previous leaf in key order costs amortized O(1) without any leaf holding a
//! pointer to its neighbours (those pointers would have to change whenever a
//! neighbour is inserted, and leaves are shared between snapshots).

use std::cmp::Ordering;

use crate::node::{LeafNode, Node};

/// Position on a leaf plus the ancestor path needed to move from it.
///
/// `stack` holds every ancestor of `current` together with the index of the
/// edge taken out of it. `current` is always a node carrying a leaf.
pub(crate) struct LeafCursor<'a, V> {
    stack: Vec<(&'a Node<V>, usize)>,
    current: Option<&'a Node<V>>,
}

impl<'a, V> LeafCursor<'a, V> {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            current: None,
        }
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.current = None;
    }

    #[inline]
    fn leaf(&self) -> Option<&'a LeafNode<V>> {
        self.current.and_then(|n| n.leaf())
    }

    /// Moves to the smallest leaf of `node`'s subtree.
    fn seek_first(&mut self, mut node: &'a Node<V>) {
        loop {
            if node.is_leaf() {
                self.current = Some(node);
                return;
            }
            match node.edges().first() {
                Some(edge) => {
                    self.stack.push((node, 0));
                    node = edge.node();
                }
                None => {
                    // Only an empty root gets here.
                    self.reset();
                    return;
                }
            }
        }
    }

    /// Moves to the largest leaf of `node`'s subtree.
    fn seek_last(&mut self, mut node: &'a Node<V>) {
        loop {
            let edges = node.edges();
            match edges.last() {
                Some(edge) => {
                    self.stack.push((node, edges.len() - 1));
                    node = edge.node();
                }
                None if node.is_leaf() => {
                    self.current = Some(node);
                    return;
                }
                None => {
                    self.reset();
                    return;
                }
            }
        }
    }

    fn advance(&mut self) {
        let Some(node) = self.current.take() else {
            return;
        };
        match node.edges().first() {
            Some(edge) => {
                self.stack.push((node, 0));
                self.seek_first(edge.node());
            }
            None => self.skip_subtree(),
        }
    }

    fn retreat(&mut self) {
        if self.current.take().is_some() {
            self.skip_subtree_back();
        }
    }

    /// Moves to the first leaf after the subtree hanging off the stack top.
    fn skip_subtree(&mut self) {
        while let Some((parent, idx)) = self.stack.pop() {
            if let Some(edge) = parent.edges().get(idx + 1) {
                self.stack.push((parent, idx + 1));
                self.seek_first(edge.node());
                return;
            }
        }
        self.current = None;
    }

    /// Moves to the last leaf before the subtree hanging off the stack top.
    fn skip_subtree_back(&mut self) {
        while let Some((parent, idx)) = self.stack.pop() {
            if idx > 0 {
                self.stack.push((parent, idx - 1));
                self.seek_last(parent.edges()[idx - 1].node());
                return;
            }
            if parent.is_leaf() {
                self.current = Some(parent);
                return;
            }
        }
        self.current = None;
    }

    /// Descends to the subtree holding every key that starts with `prefix`,
    /// recording the path. Returns `None` when no key does.
    fn seek_subtree(&mut self, root: &'a Node<V>, prefix: &[u8]) -> Option<&'a Node<V>> {
        self.reset();
        let mut node = root;
        let mut search = prefix;
        loop {
            if search.is_empty() {
                return Some(node);
            }
            let idx = node.edge_index(search[0]).ok()?;
            let child = node.edges()[idx].node();
            if search.starts_with(child.prefix()) {
                self.stack.push((node, idx));
                search = &search[child.prefix().len()..];
                node = child;
            } else if child.prefix().starts_with(search) {
                self.stack.push((node, idx));
                return Some(child);
            } else {
                self.reset();
                return None;
            }
        }
    }

    /// Positions on the smallest key `>= key`.
    fn seek_lower_bound(&mut self, root: &'a Node<V>, key: &[u8]) {
        self.reset();
        let mut node = root;
        let mut search = key;
        loop {
            match compare_prefix(node.prefix(), search) {
                // Everything below is larger than the key.
                Ordering::Greater => return self.seek_first(node),
                // Everything below is smaller than the key.
                Ordering::Less => return self.skip_subtree(),
                Ordering::Equal => {}
            }

            search = &search[node.prefix().len()..];
            if search.is_empty() {
                return self.seek_first(node);
            }

            match node.get_lower_bound_edge(search[0]) {
                (Some(child), idx) => {
                    self.stack.push((node, idx));
                    node = child;
                }
                (None, _) => return self.skip_subtree(),
            }
        }
    }

    /// Positions on the largest key `<= key`.
    fn seek_reverse_lower_bound(&mut self, root: &'a Node<V>, key: &[u8]) {
        self.reset();
        let mut node = root;
        let mut search = key;
        loop {
            match compare_prefix(node.prefix(), search) {
                Ordering::Less => return self.seek_last(node),
                Ordering::Greater => return self.skip_subtree_back(),
                Ordering::Equal => {}
            }

            search = &search[node.prefix().len()..];
            if search.is_empty() {
                if node.is_leaf() {
                    self.current = Some(node);
                } else {
                    self.skip_subtree_back();
                }
                return;
            }

            match node.get_lower_bound_edge(search[0]) {
                (Some(child), idx) => {
                    self.stack.push((node, idx));
                    node = child;
                }
                (None, idx) => {
                    if idx > 0 {
                        self.stack.push((node, idx - 1));
                        self.seek_last(node.edges()[idx - 1].node());
                    } else if node.is_leaf() {
                        self.current = Some(node);
                    } else {
                        self.skip_subtree_back();
                    }
                    return;
                }
            }
        }
    }
}

/// Compares a node prefix with the same-length head of the remaining search.
/// A prefix that extends past the end of the search compares greater.
#[inline]
fn compare_prefix(prefix: &[u8], search: &[u8]) -> Ordering {
    if prefix.len() <= search.len() {
        prefix.cmp(&search[..prefix.len()])
    } else {
        prefix.cmp(search)
    }
}

/// Forward iterator, optionally restricted to keys with a given prefix.
///
/// Yields `(key, value)` in ascending key order.
pub struct Iter<'a, V> {
    root: &'a Node<V>,
    cursor: LeafCursor<'a, V>,
    prefix: Vec<u8>,
}

impl<'a, V> Iter<'a, V> {
    pub(crate) fn new(root: &'a Node<V>) -> Self {
        let mut cursor = LeafCursor::new();
        cursor.seek_first(root);
        Self {
            root,
            cursor,
            prefix: Vec::new(),
        }
    }

    /// Restarts the iteration at the keys starting with `prefix`.
    pub fn seek_prefix(&mut self, prefix: &[u8]) {
        self.prefix.clear();
        self.prefix.extend_from_slice(prefix);
        if let Some(subtree) = self.cursor.seek_subtree(self.root, prefix) {
            self.cursor.seek_first(subtree);
        }
    }

    fn step_forward(&mut self) -> Option<&'a LeafNode<V>> {
        let leaf = self.cursor.leaf()?;
        if !leaf.key().starts_with(&self.prefix) {
            self.cursor.reset();
            return None;
        }
        self.cursor.advance();
        Some(leaf)
    }

    fn step_back(&mut self) -> Option<&'a LeafNode<V>> {
        let leaf = self.cursor.leaf()?;
        if !leaf.key().starts_with(&self.prefix) {
            self.cursor.reset();
            return None;
        }
        self.cursor.retreat();
        Some(leaf)
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.step_forward().map(|leaf| (leaf.key(), leaf.value()))
    }
}

/// Backward iterator: yields `(key, value)` in descending key order.
pub struct ReverseIter<'a, V> {
    inner: Iter<'a, V>,
}

impl<'a, V> ReverseIter<'a, V> {
    pub(crate) fn new(root: &'a Node<V>) -> Self {
        let mut inner = Iter::new(root);
        inner.cursor.reset();
        inner.cursor.seek_last(root);
        Self { inner }
    }

    /// Restarts at the largest key starting with `prefix`; iteration stops
    /// once keys no longer carry the prefix.
    pub fn seek_prefix(&mut self, prefix: &[u8]) {
        let inner = &mut self.inner;
        inner.prefix.clear();
        inner.prefix.extend_from_slice(prefix);
        if let Some(subtree) = inner.cursor.seek_subtree(inner.root, prefix) {
            inner.cursor.seek_last(subtree);
        }
    }

    /// Restarts at the largest key `<= key`, with no prefix restriction.
    pub fn seek_reverse_lower_bound(&mut self, key: &[u8]) {
        self.inner.prefix.clear();
        self.inner.cursor.seek_reverse_lower_bound(self.inner.root, key);
    }

    /// The current entry, moving one step towards smaller keys.
    pub fn previous(&mut self) -> Option<(&'a [u8], &'a V)> {
        self.inner
            .step_back()
            .map(|leaf| (leaf.key(), leaf.value()))
    }
}

impl<'a, V> Iterator for ReverseIter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.previous()
    }
}

/// Forward iterator starting from the smallest key `>=` a sought key.
pub struct LowerBoundIter<'a, V> {
    inner: Iter<'a, V>,
}

impl<'a, V> LowerBoundIter<'a, V> {
    pub(crate) fn new(root: &'a Node<V>) -> Self {
        Self {
            inner: Iter::new(root),
        }
    }

    pub fn seek_lower_bound(&mut self, key: &[u8]) {
        self.inner.prefix.clear();
        self.inner.cursor.seek_lower_bound(self.inner.root, key);
    }
}

impl<'a, V> Iterator for LowerBoundIter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
