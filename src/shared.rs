//! A shared publish point for tree snapshots.
//!
//! [`SharedTree`] keeps the current [`Tree`] behind a lock. Readers clone the
//! snapshot and then work lock-free; writers are serialized and each
//! successful [`update`](SharedTree::update) swaps in exactly one new root.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::tree::Tree;
use crate::txn::{Change, Transaction};

/// Configuration for a [`SharedTree`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Longest key accepted by [`SharedTree::insert`]. `None` means no limit.
    pub max_key_len: Option<usize>,
    /// Record changes in every update. Watchers only fire when this is on.
    pub track_changes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_key_len: None,
            track_changes: true,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.max_key_len == Some(0) {
            return Err(Error::InvalidConfig(
                "max_key_len must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handle returned by [`SharedTree::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

type WatchFn<V> = Arc<dyn Fn(&Tree<V>, &[Change]) + Send + Sync>;

struct Watcher<V> {
    id: WatchId,
    prefix: Box<[u8]>,
    callback: WatchFn<V>,
}

/// The current snapshot plus a serialized writer path.
pub struct SharedTree<V> {
    current: RwLock<Tree<V>>,
    writer: Mutex<()>,
    watchers: RwLock<Vec<Watcher<V>>>,
    next_watch_id: AtomicU64,
    config: Config,
}

impl<V> SharedTree<V> {
    pub fn new() -> Self {
        Self::from_tree(Tree::new(), Config::default())
    }

    /// Creates an empty shared tree after validating `config`.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_tree(Tree::new(), config))
    }

    /// Seeds a shared tree with an existing snapshot.
    pub fn from_snapshot(tree: Tree<V>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_tree(tree, config))
    }

    fn from_tree(tree: Tree<V>, config: Config) -> Self {
        Self {
            current: RwLock::new(tree),
            writer: Mutex::new(()),
            watchers: RwLock::new(Vec::new()),
            next_watch_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current snapshot. Later updates do not affect it.
    pub fn snapshot(&self) -> Tree<V> {
        self.current.read().clone()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Calls `callback` after every commit that changes a key starting with
    /// `prefix`.
    pub fn watch<F>(&self, prefix: &[u8], callback: F) -> WatchId
    where
        F: Fn(&Tree<V>, &[Change]) + Send + Sync + 'static,
    {
        let id = WatchId(self.next_watch_id.fetch_add(1, Ordering::Relaxed));
        self.watchers.write().push(Watcher {
            id,
            prefix: prefix.into(),
            callback: Arc::new(callback),
        });
        id
    }

    /// Removes a watcher. Returns `false` if it was already gone.
    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut watchers = self.watchers.write();
        let before = watchers.len();
        watchers.retain(|w| w.id != id);
        watchers.len() != before
    }

    /// Runs `f` on a transaction over the current snapshot and publishes the
    /// result if `f` succeeds. On error nothing is published.
    pub fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<V>) -> Result<R>,
    {
        self.run(f)
    }

    fn run<R, E>(
        &self,
        f: impl FnOnce(&mut Transaction<V>) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E> {
        let writer = self.writer.lock();

        let mut txn = self.current.read().txn();
        txn.track_changes(self.config.track_changes);
        txn.set_max_key_len(self.config.max_key_len);

        let out = f(&mut txn)?;
        let changes = txn.changes().to_vec();
        let tree = txn.commit();
        *self.current.write() = tree.clone();
        drop(writer);

        debug!(size = tree.len(), changes = changes.len(), "published snapshot");
        self.notify(&tree, &changes);
        Ok(out)
    }

    fn notify(&self, tree: &Tree<V>, changes: &[Change]) {
        if changes.is_empty() {
            return;
        }
        let hit: Vec<WatchFn<V>> = self
            .watchers
            .read()
            .iter()
            .filter(|w| changes.iter().any(|c| c.touches(&w.prefix)))
            .map(|w| Arc::clone(&w.callback))
            .collect();
        if !hit.is_empty() {
            debug!(watchers = hit.len(), "notifying watchers");
        }
        for callback in hit {
            callback(tree, changes);
        }
    }
}

impl<V: Clone> SharedTree<V> {
    pub fn get(&self, key: &[u8]) -> Option<V> {
        self.current.read().get(key).cloned()
    }

    /// Inserts one key, honouring the configured key length limit.
    pub fn insert(&self, key: &[u8], value: V) -> Result<Option<V>> {
        self.update(|txn| txn.try_insert(key, value))
    }

    pub fn delete(&self, key: &[u8]) -> Option<V> {
        self.apply(|txn| txn.delete(key))
    }

    /// Removes every key starting with `prefix` and returns the count.
    pub fn delete_prefix(&self, prefix: &[u8]) -> usize {
        self.apply(|txn| txn.delete_prefix(prefix))
    }

    fn apply<R>(&self, f: impl FnOnce(&mut Transaction<V>) -> R) -> R {
        self.run(|txn| Ok::<_, Infallible>(f(txn)))
            .unwrap_or_else(|never| match never {})
    }
}

impl<V> Default for SharedTree<V> {
    fn default() -> Self {
        Self::new()
    }
}
