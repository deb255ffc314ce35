//! The leaf directory.
//!
//! Stand-in for the external trie collaborator: an ordered map from each
//! leaf's lower bound to the leaf, offering the point lookup and successor
//! operations the storage needs. Lookups never fail — the directory always
//! covers the whole key universe, starting with a single leaf over
//! `[KEY_MIN, KEY_MAX)`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::key::Key;
use super::leaf::Leaf;

/// Ordered directory of leaves, keyed by lower bound.
pub struct Index {
    map: RwLock<BTreeMap<Key, Arc<Leaf>>>,
}

impl Index {
    /// A directory holding the given root leaf.
    pub fn new(first: Arc<Leaf>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(first.lo(), first);
        Self {
            map: RwLock::new(map),
        }
    }

    /// The leaf whose range contains `key`.
    pub fn find(&self, key: Key) -> Arc<Leaf> {
        let map = self.map.read();
        let (_, leaf) = map
            .range(..=key)
            .next_back()
            .expect("the directory always covers the key universe");
        Arc::clone(leaf)
    }

    /// The first leaf with a lower bound strictly greater than `key`.
    pub fn next_leaf(&self, key: Key) -> Option<Arc<Leaf>> {
        let map = self.map.read();
        map.range((std::ops::Bound::Excluded(key), std::ops::Bound::Unbounded))
            .next()
            .map(|(_, leaf)| Arc::clone(leaf))
    }

    /// Atomically removes the leaves keyed by `remove` and inserts the
    /// replacements. Used by splits and merges.
    pub fn replace(&self, remove: &[Key], insert: Vec<Arc<Leaf>>) {
        let mut map = self.map.write();
        for key in remove {
            map.remove(key);
        }
        for leaf in insert {
            map.insert(leaf.lo(), leaf);
        }
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Whether the directory is empty (only after [`Index::clear`]).
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Every leaf in key order.
    pub fn leaves(&self) -> Vec<Arc<Leaf>> {
        self.map.read().values().cloned().collect()
    }

    /// Drops every leaf. Part of the engine shutdown.
    pub fn clear(&self) {
        self.map.write().clear();
    }
}
