//! Tree inspection helpers for tests and debugging.

use std::fmt;

use crate::node::Node;
use crate::tree::Tree;

impl<V> Tree<V> {
    /// Checks every structural invariant and returns one message per
    /// violation. An empty vector means the tree is well formed.
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.root.prefix().is_empty() {
            issues.push(format!(
                "root has non-empty prefix {:?}",
                String::from_utf8_lossy(self.root.prefix())
            ));
        }
        if self.root.leaves_in_subtree() != self.size {
            issues.push(format!(
                "size {} but root counts {} leaves",
                self.size,
                self.root.leaves_in_subtree()
            ));
        }

        let mut path = Vec::new();
        verify_node(self.root(), &mut path, true, &mut issues);
        issues
    }
}

/// Returns the number of leaves actually found below `node`.
fn verify_node<V>(node: &Node<V>, path: &mut Vec<u8>, is_root: bool, issues: &mut Vec<String>) -> usize {
    let depth = path.len();
    path.extend_from_slice(node.prefix());
    let here = String::from_utf8_lossy(&path[..]).into_owned();

    if !is_root {
        if node.prefix().is_empty() {
            issues.push(format!("node at {here:?} has an empty prefix"));
        }
        if node.leaf().is_none() {
            match node.edges().len() {
                0 => issues.push(format!("node at {here:?} is empty")),
                1 => issues.push(format!("node at {here:?} has one edge and no leaf")),
                _ => {}
            }
        }
    }

    if let Some(leaf) = node.leaf() {
        if leaf.key() != path.as_slice() {
            issues.push(format!(
                "leaf at {here:?} carries key {:?}",
                String::from_utf8_lossy(leaf.key())
            ));
        }
    }

    let mut count = usize::from(node.is_leaf());
    let mut prev_label: Option<u8> = None;
    for edge in node.edges() {
        if prev_label.is_some_and(|p| p >= edge.label()) {
            issues.push(format!("edges at {here:?} out of order at {:#04x}", edge.label()));
        }
        prev_label = Some(edge.label());

        if edge.node().prefix().first() != Some(&edge.label()) {
            issues.push(format!(
                "edge {:#04x} at {here:?} points at prefix {:?}",
                edge.label(),
                String::from_utf8_lossy(edge.node().prefix())
            ));
        }
        count += verify_node(edge.node(), path, false, issues);
    }

    if count != node.leaves_in_subtree() {
        issues.push(format!(
            "node at {here:?} caches {} leaves, found {count}",
            node.leaves_in_subtree()
        ));
    }

    let expected_min = match node.leaf() {
        Some(leaf) => Some(leaf.key()),
        None => node.edges().first().and_then(|e| e.node().min_leaf()).map(|l| l.key()),
    };
    if node.min_leaf().map(|l| l.key()) != expected_min {
        issues.push(format!("node at {here:?} has a stale min leaf"));
    }
    let expected_max = match node.edges().last() {
        Some(edge) => edge.node().max_leaf().map(|l| l.key()),
        None => node.leaf().map(|l| l.key()),
    };
    if node.max_leaf().map(|l| l.key()) != expected_max {
        issues.push(format!("node at {here:?} has a stale max leaf"));
    }

    path.truncate(depth);
    count
}

impl<V: fmt::Debug> Tree<V> {
    /// Renders the node structure as an indented outline.
    pub fn dump(&self) -> String {
        let mut out = format!("Tree (size {})\n", self.size);
        dump_node(self.root(), 1, &mut out);
        out
    }
}

fn dump_node<V: fmt::Debug>(node: &Node<V>, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    out.push_str(&format!(
        "{pad}[{}] leaves={}",
        String::from_utf8_lossy(node.prefix()),
        node.leaves_in_subtree()
    ));
    if let Some(leaf) = node.leaf() {
        out.push_str(&format!(" = {:?}", leaf.value()));
    }
    out.push('\n');
    for edge in node.edges() {
        dump_node(edge.node(), indent + 1, out);
    }
}
