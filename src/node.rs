//! Trie vertices, edges and leaves.
//!
//! A [`Node`] owns an optional leaf, the prefix consumed to reach it from its
//! parent, and an edge list sorted by label. Every node also caches the
//! extreme leaves of its subtree and the subtree's leaf count.
//! [`Node::compute_links`] refreshes those caches from the node's own leaf and
//! its children, so it has to run on every node a mutation touches, innermost
//! first. Published nodes are never edited: they sit behind an [`Arc`] and the
//! transaction copies them before writing.
//!
//! Leaves carry no neighbour links, since relinking would write into leaves
//! shared with older snapshots. Ordered stepping between leaves is done by
//! `iter::LeafCursor` instead.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

/// Bytes consumed between a parent and a node.
pub(crate) type Prefix = SmallVec<[u8; 16]>;

type Edges<V> = SmallVec<[Edge<V>; 4]>;

/// A stored key together with its value.
pub struct LeafNode<V> {
    key: Box<[u8]>,
    value: V,
}

impl<V> LeafNode<V> {
    pub(crate) fn new(key: &[u8], value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }
}

impl<V: fmt::Debug> fmt::Debug for LeafNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafNode")
            .field("key", &String::from_utf8_lossy(&self.key))
            .field("value", &self.value)
            .finish()
    }
}

/// A labelled pointer from a node to one of its children.
///
/// The label is always the first byte of the child's prefix.
pub struct Edge<V> {
    pub(crate) label: u8,
    pub(crate) node: Arc<Node<V>>,
}

impl<V> Edge<V> {
    pub(crate) fn new(label: u8, node: Arc<Node<V>>) -> Self {
        Self { label, node }
    }

    #[inline]
    pub fn label(&self) -> u8 {
        self.label
    }

    #[inline]
    pub fn node(&self) -> &Node<V> {
        &self.node
    }
}

impl<V> Clone for Edge<V> {
    fn clone(&self) -> Self {
        Self {
            label: self.label,
            node: Arc::clone(&self.node),
        }
    }
}

/// A vertex of the radix tree.
pub struct Node<V> {
    pub(crate) leaf: Option<Arc<LeafNode<V>>>,
    pub(crate) prefix: Prefix,
    pub(crate) edges: Edges<V>,
    pub(crate) min_leaf: Option<Arc<LeafNode<V>>>,
    pub(crate) max_leaf: Option<Arc<LeafNode<V>>>,
    pub(crate) leaves_in_subtree: usize,
}

impl<V> Node<V> {
    pub(crate) fn new() -> Self {
        Self {
            leaf: None,
            prefix: Prefix::new(),
            edges: Edges::new(),
            min_leaf: None,
            max_leaf: None,
            leaves_in_subtree: 0,
        }
    }

    pub(crate) fn with_prefix(prefix: &[u8]) -> Self {
        Self {
            prefix: Prefix::from_slice(prefix),
            ..Self::new()
        }
    }

    /// A childless node holding `leaf`, reached by consuming `prefix`.
    pub(crate) fn with_leaf(prefix: &[u8], leaf: Arc<LeafNode<V>>) -> Self {
        let mut node = Self::with_prefix(prefix);
        node.leaf = Some(leaf);
        node.compute_links();
        node
    }

    #[inline]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    #[inline]
    pub fn leaf(&self) -> Option<&LeafNode<V>> {
        self.leaf.as_deref()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }

    #[inline]
    pub fn edges(&self) -> &[Edge<V>] {
        &self.edges
    }

    /// Smallest leaf in this subtree.
    #[inline]
    pub fn min_leaf(&self) -> Option<&LeafNode<V>> {
        self.min_leaf.as_deref()
    }

    /// Largest leaf in this subtree.
    #[inline]
    pub fn max_leaf(&self) -> Option<&LeafNode<V>> {
        self.max_leaf.as_deref()
    }

    /// Number of leaves under this node, its own leaf included.
    #[inline]
    pub fn leaves_in_subtree(&self) -> usize {
        self.leaves_in_subtree
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.leaf.is_none() && self.edges.is_empty()
    }

    /// Position of the edge labelled `label`, or where it would be inserted.
    #[inline]
    pub(crate) fn edge_index(&self, label: u8) -> Result<usize, usize> {
        self.edges.binary_search_by_key(&label, |e| e.label)
    }

    pub fn get_edge(&self, label: u8) -> Option<&Node<V>> {
        self.edge_index(label)
            .ok()
            .map(|idx| &*self.edges[idx].node)
    }

    pub(crate) fn add_edge(&mut self, edge: Edge<V>) {
        match self.edge_index(edge.label) {
            Ok(_) => panic!("add_edge: label {:#04x} already present", edge.label),
            Err(idx) => self.edges.insert(idx, edge),
        }
    }

    /// Points the existing edge for `edge.label` at `edge.node`.
    ///
    /// # Panics
    ///
    /// Panics if no edge carries that label.
    pub(crate) fn replace_edge(&mut self, edge: Edge<V>) {
        match self.edge_index(edge.label) {
            Ok(idx) => self.edges[idx].node = edge.node,
            Err(_) => panic!("replace_edge: no edge for label {:#04x}", edge.label),
        }
    }

    pub(crate) fn del_edge(&mut self, label: u8) -> Option<Arc<Node<V>>> {
        let idx = self.edge_index(label).ok()?;
        Some(self.edges.remove(idx).node)
    }

    /// First edge whose label is `>= label`, with its index. When every label
    /// is smaller the child is `None` and the index equals the edge count.
    pub fn get_lower_bound_edge(&self, label: u8) -> (Option<&Node<V>>, usize) {
        let idx = self.edges.partition_point(|e| e.label < label);
        (self.edges.get(idx).map(|e| &*e.node), idx)
    }

    /// Recomputes the cached min/max leaves and the subtree leaf count.
    ///
    /// Children must already be up to date.
    pub(crate) fn compute_links(&mut self) {
        let mut count = usize::from(self.leaf.is_some());
        for edge in &self.edges {
            count += edge.node.leaves_in_subtree;
        }
        self.leaves_in_subtree = count;

        self.min_leaf = match &self.leaf {
            Some(leaf) => Some(Arc::clone(leaf)),
            None => self.edges.first().and_then(|e| e.node.min_leaf.clone()),
        };
        self.max_leaf = match self.edges.last() {
            Some(edge) => edge.node.max_leaf.clone(),
            None => self.leaf.clone(),
        };
    }

    /// Collapses a leafless node into its single child.
    ///
    /// The prefixes are concatenated and the child's leaf and edges are
    /// adopted. The child itself is reused when nothing else references it.
    pub(crate) fn merge_child(&mut self) {
        debug_assert!(self.leaf.is_none());
        debug_assert_eq!(self.edges.len(), 1);
        let Some(edge) = self.edges.pop() else {
            return;
        };

        self.prefix.extend_from_slice(&edge.node.prefix);
        match Arc::try_unwrap(edge.node) {
            Ok(child) => {
                self.leaf = child.leaf;
                self.edges = child.edges;
            }
            Err(child) => {
                self.leaf = child.leaf.clone();
                self.edges = child.edges.clone();
            }
        }
        self.compute_links();
    }

    /// Leaf of rank `idx` (0-based, ascending key order) in this subtree.
    pub(crate) fn get_at_index(&self, mut idx: usize) -> Option<&LeafNode<V>> {
        if idx >= self.leaves_in_subtree {
            return None;
        }

        let mut node = self;
        'descend: loop {
            if let Some(leaf) = &node.leaf {
                if idx == 0 {
                    return Some(leaf);
                }
                idx -= 1;
            }
            for edge in &node.edges {
                let count = edge.node.leaves_in_subtree;
                if idx < count {
                    node = &edge.node;
                    continue 'descend;
                }
                idx -= count;
            }
            // Counts disagree with the structure.
            debug_assert!(false, "leaves_in_subtree out of sync");
            return None;
        }
    }

    /// Leaf stored under exactly `key` (relative to this node).
    pub(crate) fn find_leaf(&self, key: &[u8]) -> Option<&LeafNode<V>> {
        let mut node = self;
        let mut search = key;
        loop {
            if search.is_empty() {
                return node.leaf();
            }
            let child = node.get_edge(search[0])?;
            if !search.starts_with(&child.prefix) {
                return None;
            }
            search = &search[child.prefix.len()..];
            node = child;
        }
    }

    /// The node whose subtree holds exactly the keys starting with `prefix`
    /// (relative to this node), if any key does.
    pub(crate) fn subtree_for_prefix(&self, prefix: &[u8]) -> Option<&Node<V>> {
        let mut node = self;
        let mut search = prefix;
        loop {
            if search.is_empty() {
                return (node.leaves_in_subtree > 0).then_some(node);
            }
            let child = node.get_edge(search[0])?;
            if search.starts_with(&child.prefix) {
                search = &search[child.prefix.len()..];
                node = child;
            } else if child.prefix.starts_with(search) {
                return Some(child);
            } else {
                return None;
            }
        }
    }
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for Node<V> {
    fn clone(&self) -> Self {
        Self {
            leaf: self.leaf.clone(),
            prefix: self.prefix.clone(),
            edges: self.edges.clone(),
            min_leaf: self.min_leaf.clone(),
            max_leaf: self.max_leaf.clone(),
            leaves_in_subtree: self.leaves_in_subtree,
        }
    }
}

impl<V> fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("prefix", &String::from_utf8_lossy(&self.prefix))
            .field("leaf", &self.leaf.as_ref().map(|l| String::from_utf8_lossy(&l.key)))
            .field(
                "labels",
                &self.edges.iter().map(|e| e.label as char).collect::<String>(),
            )
            .field("leaves_in_subtree", &self.leaves_in_subtree)
            .finish()
    }
}

/// Length of the longest common prefix of `a` and `b`.
#[inline]
pub(crate) fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
