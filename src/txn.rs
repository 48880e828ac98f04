//! Batched copy-on-write mutation.
//!
//! A [`Transaction`] starts from a snapshot's root and copies a node the
//! first time a write path reaches it. Copies are owned by the transaction
//! alone (refcount 1), so later writes through the same path edit them in
//! place via [`Arc::make_mut`]; nodes still shared with a published
//! snapshot are cloned instead. Committing hands the new root to a fresh
//! [`Tree`] and leaves every earlier snapshot untouched.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::node::{longest_common_prefix, Edge, LeafNode, Node, Prefix};
use crate::tree::Tree;

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Insert(Box<[u8]>),
    Delete(Box<[u8]>),
    DeletePrefix(Box<[u8]>),
}

impl Change {
    /// The key (or prefix) the change applies to.
    pub fn key(&self) -> &[u8] {
        match self {
            Change::Insert(k) | Change::Delete(k) | Change::DeletePrefix(k) => k,
        }
    }

    /// Whether the change can affect a key starting with `prefix`.
    pub fn touches(&self, prefix: &[u8]) -> bool {
        match self {
            Change::Insert(k) | Change::Delete(k) => k.starts_with(prefix),
            Change::DeletePrefix(p) => p.starts_with(prefix) || prefix.starts_with(p),
        }
    }
}

type CommitHook<V> = Arc<dyn Fn(&Tree<V>, &[Change]) + Send + Sync>;

/// A batch of writes against one snapshot.
pub struct Transaction<V> {
    root: Arc<Node<V>>,
    size: usize,
    changes: Option<Vec<Change>>,
    hooks: Vec<CommitHook<V>>,
    max_key_len: Option<usize>,
}

impl<V> Transaction<V> {
    pub(crate) fn new(tree: &Tree<V>) -> Self {
        Self {
            root: Arc::clone(&tree.root),
            size: tree.size,
            changes: None,
            hooks: Vec::new(),
            max_key_len: None,
        }
    }

    /// Number of keys in the transaction's working tree.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Starts or stops recording [`Change`]s. Stopping drops what was
    /// recorded so far.
    pub fn track_changes(&mut self, enabled: bool) {
        match (enabled, self.changes.is_some()) {
            (true, false) => self.changes = Some(Vec::new()),
            (false, true) => self.changes = None,
            _ => {}
        }
    }

    /// Changes recorded so far, in application order.
    pub fn changes(&self) -> &[Change] {
        self.changes.as_deref().unwrap_or(&[])
    }

    /// Registers a callback run by [`commit`](Self::commit) with the new tree
    /// and the recorded changes.
    pub fn on_commit<F>(&mut self, hook: F)
    where
        F: Fn(&Tree<V>, &[Change]) + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
    }

    /// Rejects keys longer than `max` in [`try_insert`](Self::try_insert).
    pub fn set_max_key_len(&mut self, max: Option<usize>) {
        self.max_key_len = max;
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.root.find_leaf(key).map(|leaf| leaf.value())
    }

    fn record(&mut self, change: impl FnOnce() -> Change) {
        if let Some(changes) = &mut self.changes {
            changes.push(change());
        }
    }

    /// Publishes the working tree and runs the commit hooks.
    pub fn commit(self) -> Tree<V> {
        let tree = Tree::from_parts(self.root, self.size);
        let changes = self.changes.unwrap_or_default();
        debug!(
            size = tree.size,
            changes = changes.len(),
            hooks = self.hooks.len(),
            "transaction committed"
        );
        for hook in &self.hooks {
            hook(&tree, &changes);
        }
        tree
    }

    /// Publishes the working tree without running any hook.
    pub fn commit_only(self) -> Tree<V> {
        Tree::from_parts(self.root, self.size)
    }
}

impl<V: Clone> Transaction<V> {
    /// Maps `key` to `value`, returning the replaced value.
    pub fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        let leaf = Arc::new(LeafNode::new(key, value));
        let old = insert_rec(&mut self.root, key, leaf);
        if old.is_none() {
            self.size += 1;
        }
        self.record(|| Change::Insert(key.into()));
        old
    }

    /// Like [`insert`](Self::insert), but refuses keys over the configured
    /// maximum length.
    pub fn try_insert(&mut self, key: &[u8], value: V) -> Result<Option<V>> {
        if let Some(max) = self.max_key_len {
            if key.len() > max {
                warn!(size = key.len(), max, "rejecting oversized key");
                return Err(Error::KeyTooLarge {
                    size: key.len(),
                    max,
                });
            }
        }
        Ok(self.insert(key, value))
    }

    /// Removes `key`, returning its value.
    pub fn delete(&mut self, key: &[u8]) -> Option<V> {
        let old = self.root.find_leaf(key)?.value().clone();
        let removal = delete_rec(&mut self.root, key, true);
        debug_assert!(removal.found);
        self.size -= 1;
        self.record(|| Change::Delete(key.into()));
        Some(old)
    }

    /// Removes every key starting with `prefix`, returning how many there
    /// were.
    pub fn delete_prefix(&mut self, prefix: &[u8]) -> usize {
        let Some(subtree) = self.root.subtree_for_prefix(prefix) else {
            return 0;
        };
        let expected = subtree.leaves_in_subtree();

        let removed = if prefix.is_empty() {
            self.root = Arc::new(Node::new());
            expected
        } else {
            delete_prefix_rec(&mut self.root, prefix, true)
        };
        debug_assert_eq!(removed, expected);
        trace!(
            prefix = %String::from_utf8_lossy(prefix),
            removed,
            "deleted prefix"
        );

        self.size -= removed;
        self.record(|| Change::DeletePrefix(prefix.into()));
        removed
    }
}

/// Inserts `leaf` at `search` below `slot`, copying the node first if it is
/// shared. Returns the value of a replaced leaf.
fn insert_rec<V: Clone>(slot: &mut Arc<Node<V>>, search: &[u8], leaf: Arc<LeafNode<V>>) -> Option<V> {
    let node = Arc::make_mut(slot);

    if search.is_empty() {
        let old = node.leaf.replace(leaf);
        node.compute_links();
        return old.map(|l| l.value().clone());
    }

    let label = search[0];
    let idx = match node.edge_index(label) {
        Ok(idx) => idx,
        Err(_) => {
            node.add_edge(Edge::new(label, Arc::new(Node::with_leaf(search, leaf))));
            node.compute_links();
            return None;
        }
    };

    let child_prefix_len = node.edges[idx].node.prefix.len();
    let common = longest_common_prefix(search, &node.edges[idx].node.prefix);

    if common == child_prefix_len {
        let old = insert_rec(&mut node.edges[idx].node, &search[common..], leaf);
        node.compute_links();
        return old;
    }

    // The key diverges inside the child's prefix: put a split node in front.
    trace!(label, common, "splitting edge");
    let mut split = Node::with_prefix(&search[..common]);
    {
        // Trim through the edge so a transaction-owned child is edited in place.
        let child = Arc::make_mut(&mut node.edges[idx].node);
        child.prefix = Prefix::from_slice(&child.prefix[common..]);
    }
    let existing = Arc::clone(&node.edges[idx].node);
    split.add_edge(Edge::new(existing.prefix[0], existing));

    let rest = &search[common..];
    if rest.is_empty() {
        split.leaf = Some(leaf);
    } else {
        split.add_edge(Edge::new(rest[0], Arc::new(Node::with_leaf(rest, leaf))));
    }
    split.compute_links();

    node.replace_edge(Edge::new(label, Arc::new(split)));
    node.compute_links();
    None
}

/// Outcome of [`delete_rec`] for one node.
#[derive(Debug, Clone, Copy)]
struct Removal {
    /// A leaf was removed somewhere below.
    found: bool,
    /// The node has neither leaf nor edges and must be unlinked by its parent.
    now_empty: bool,
}

/// Removes the leaf at `search` below `slot`. The caller has checked that it
/// exists.
fn delete_rec<V: Clone>(slot: &mut Arc<Node<V>>, search: &[u8], is_root: bool) -> Removal {
    let node = Arc::make_mut(slot);

    let found = if search.is_empty() {
        node.leaf.take().is_some()
    } else {
        let label = search[0];
        let Ok(idx) = node.edge_index(label) else {
            return Removal {
                found: false,
                now_empty: false,
            };
        };
        let plen = node.edges[idx].node.prefix.len();
        let below = delete_rec(&mut node.edges[idx].node, &search[plen..], false);
        if below.now_empty {
            node.del_edge(label);
        }
        below.found
    };

    if !is_root && node.leaf.is_none() && node.edges.len() == 1 {
        trace!(prefix_len = node.prefix.len(), "merging single child");
        node.merge_child();
    } else {
        node.compute_links();
    }
    Removal {
        found,
        now_empty: !is_root && node.is_empty(),
    }
}

/// Drops every subtree below `slot` whose keys start with `search`. Returns
/// the number of leaves removed.
fn delete_prefix_rec<V: Clone>(slot: &mut Arc<Node<V>>, search: &[u8], is_root: bool) -> usize {
    let node = Arc::make_mut(slot);

    let label = search[0];
    let Ok(idx) = node.edge_index(label) else {
        return 0;
    };
    let child = &node.edges[idx].node;

    let removed = if child.prefix.starts_with(search) {
        let removed = child.leaves_in_subtree;
        node.del_edge(label);
        removed
    } else if search.len() > child.prefix.len() && search.starts_with(&child.prefix) {
        let plen = child.prefix.len();
        let removed = delete_prefix_rec(&mut node.edges[idx].node, &search[plen..], false);
        if node.edges[idx].node.is_empty() {
            node.del_edge(label);
        }
        removed
    } else {
        return 0;
    };

    if !is_root && node.leaf.is_none() && node.edges.len() == 1 {
        node.merge_child();
    } else {
        node.compute_links();
    }
    removed
}

impl<V> Clone for Transaction<V> {
    /// Forks the transaction. Both copies share nodes again, so the first
    /// write on either side copies what it touches.
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            size: self.size,
            changes: self.changes.clone(),
            hooks: self.hooks.clone(),
            max_key_len: self.max_key_len,
        }
    }
}

impl<V> fmt::Debug for Transaction<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("size", &self.size)
            .field("tracking", &self.changes.is_some())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl<K: AsRef<[u8]>, V: Clone> Extend<(K, V)> for Transaction<V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k.as_ref(), v);
        }
    }
}
