//! # cow-radix
//!
//! A persistent radix tree (path-compressed trie) over byte-string keys.
//!
//! Every write returns a new [`Tree`] and leaves the old one intact; the two
//! share all nodes the write did not touch. Beyond point lookups the tree
//! answers longest-prefix and all-matching-prefix queries, iterates in key
//! order in both directions from any seek position, and finds the entry of
//! a given rank in O(depth) using per-node leaf counts.
//!
//! ## Example
//!
//! ```rust
//! use cow_radix::Tree;
//!
//! let t: Tree<u32> = Tree::new();
//! let (t, _) = t.insert(b"foo", 1);
//! let (t2, _) = t.insert(b"foobar", 2);
//!
//! assert_eq!(t.len(), 1);
//! assert_eq!(t2.get(b"foobar"), Some(&2));
//! assert_eq!(t2.longest_prefix(b"foobaz"), Some((&b"foo"[..], &1)));
//! assert_eq!(t2.get_at_index(1), Some((&b"foobar"[..], &2)));
//! ```
//!
//! Batches go through a [`Transaction`], and [`SharedTree`] publishes
//! snapshots to concurrent readers.

#![forbid(unsafe_code)]

mod debug;
mod error;
mod iter;
mod node;
mod shared;
mod tree;
mod txn;

pub use error::{Error, Result};
pub use iter::{Iter, LowerBoundIter, ReverseIter};
pub use node::{Edge, LeafNode, Node};
pub use shared::{Config, SharedTree, WatchId};
pub use tree::Tree;
pub use txn::{Change, Transaction};


#[cfg(test)]
mod proptests;
