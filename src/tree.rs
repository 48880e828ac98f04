//! Immutable tree snapshots.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::iter::{Iter, LowerBoundIter, ReverseIter};
use crate::node::Node;
use crate::txn::Transaction;

/// An immutable radix tree mapping byte-string keys to values.
///
/// Every write produces a new `Tree` that shares all untouched nodes with the
/// one it was derived from. Cloning a tree is two word copies and a refcount
/// bump.
pub struct Tree<V> {
    pub(crate) root: Arc<Node<V>>,
    pub(crate) size: usize,
}

impl<V> Tree<V> {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::new()),
            size: 0,
        }
    }

    pub(crate) fn from_parts(root: Arc<Node<V>>, size: usize) -> Self {
        Self { root, size }
    }

    /// Number of keys stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn root(&self) -> &Node<V> {
        &self.root
    }

    /// Number of leaves counted at the root. Always equal to [`len`](Self::len).
    #[inline]
    pub fn leaves_in_subtree(&self) -> usize {
        self.root.leaves_in_subtree()
    }

    /// Starts a transaction on top of this snapshot.
    pub fn txn(&self) -> Transaction<V> {
        Transaction::new(self)
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.root.find_leaf(key).map(|leaf| leaf.value())
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.root.find_leaf(key).is_some()
    }

    /// Longest stored key that is a prefix of `key` (including `key` itself).
    pub fn longest_prefix(&self, key: &[u8]) -> Option<(&[u8], &V)> {
        let mut last = None;
        self.walk_path(key, |k, v| {
            last = Some((k, v));
            ControlFlow::Continue(())
        });
        last
    }

    /// Every stored key that is a prefix of `key`, shortest first.
    pub fn find_matching_prefixes(&self, key: &[u8]) -> Vec<(&[u8], &V)> {
        let mut found = Vec::new();
        self.walk_path(key, |k, v| {
            found.push((k, v));
            ControlFlow::Continue(())
        });
        found
    }

    /// Visits the leaves on the path from the root towards `key`, shortest
    /// first, until `f` breaks or the path leaves the tree.
    pub fn walk_path<'a, F>(&'a self, key: &[u8], mut f: F)
    where
        F: FnMut(&'a [u8], &'a V) -> ControlFlow<()>,
    {
        let mut node: &'a Node<V> = &self.root;
        let mut search = key;
        loop {
            if let Some(leaf) = node.leaf() {
                if f(leaf.key(), leaf.value()).is_break() {
                    return;
                }
            }
            if search.is_empty() {
                return;
            }
            let Some(child) = node.get_edge(search[0]) else {
                return;
            };
            if !search.starts_with(child.prefix()) {
                return;
            }
            search = &search[child.prefix().len()..];
            node = child;
        }
    }

    /// Entry of rank `idx` in ascending key order.
    pub fn get_at_index(&self, idx: usize) -> Option<(&[u8], &V)> {
        self.root
            .get_at_index(idx)
            .map(|leaf| (leaf.key(), leaf.value()))
    }

    pub fn minimum(&self) -> Option<(&[u8], &V)> {
        self.root.min_leaf().map(|leaf| (leaf.key(), leaf.value()))
    }

    pub fn maximum(&self) -> Option<(&[u8], &V)> {
        self.root.max_leaf().map(|leaf| (leaf.key(), leaf.value()))
    }

    /// Visits every entry in ascending key order until `f` breaks.
    pub fn walk<'a, F>(&'a self, mut f: F)
    where
        F: FnMut(&'a [u8], &'a V) -> ControlFlow<()>,
    {
        let _ = walk_node(self.root(), &mut f);
    }

    /// Visits every entry whose key starts with `prefix` in ascending order.
    pub fn walk_prefix<'a, F>(&'a self, prefix: &[u8], mut f: F)
    where
        F: FnMut(&'a [u8], &'a V) -> ControlFlow<()>,
    {
        if let Some(node) = self.root.subtree_for_prefix(prefix) {
            let _ = walk_node(node, &mut f);
        }
    }

    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(self.root())
    }

    /// Forward iterator over the keys starting with `prefix`.
    pub fn iter_prefix(&self, prefix: &[u8]) -> Iter<'_, V> {
        let mut it = Iter::new(self.root());
        it.seek_prefix(prefix);
        it
    }

    pub fn reverse_iter(&self) -> ReverseIter<'_, V> {
        ReverseIter::new(self.root())
    }

    /// Iterator to be positioned with
    /// [`LowerBoundIter::seek_lower_bound`]. Before seeking it behaves like
    /// [`iter`](Self::iter).
    pub fn lower_bound_iter(&self) -> LowerBoundIter<'_, V> {
        LowerBoundIter::new(self.root())
    }
}

fn walk_node<'a, V, F>(node: &'a Node<V>, f: &mut F) -> ControlFlow<()>
where
    F: FnMut(&'a [u8], &'a V) -> ControlFlow<()>,
{
    if let Some(leaf) = node.leaf() {
        f(leaf.key(), leaf.value())?;
    }
    for edge in node.edges() {
        walk_node(edge.node(), f)?;
    }
    ControlFlow::Continue(())
}

impl<V: Clone> Tree<V> {
    /// Returns a tree with `key` mapped to `value`, and the value it replaced.
    pub fn insert(&self, key: &[u8], value: V) -> (Tree<V>, Option<V>) {
        let mut txn = self.txn();
        let old = txn.insert(key, value);
        (txn.commit(), old)
    }

    /// Returns a tree without `key`, and the value it held.
    pub fn delete(&self, key: &[u8]) -> (Tree<V>, Option<V>) {
        let mut txn = self.txn();
        let old = txn.delete(key);
        (txn.commit(), old)
    }

    /// Returns a tree without any key starting with `prefix`, and how many
    /// keys were removed.
    pub fn delete_prefix(&self, prefix: &[u8]) -> (Tree<V>, usize) {
        let mut txn = self.txn();
        let removed = txn.delete_prefix(prefix);
        (txn.commit(), removed)
    }
}

impl<V> Clone for Tree<V> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            size: self.size,
        }
    }
}

impl<V> Default for Tree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for Tree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(k, v)| (String::from_utf8_lossy(k), v)))
            .finish()
    }
}

impl<K: AsRef<[u8]>, V: Clone> FromIterator<(K, V)> for Tree<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut txn = Tree::new().txn();
        txn.extend(iter);
        txn.commit_only()
    }
}

impl<'a, V> IntoIterator for &'a Tree<V> {
    type Item = (&'a [u8], &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
