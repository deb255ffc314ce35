//! The dense-file layout of a segment.
//!
//! When insertion churn makes the sparse layout shift too much on every
//! write, the segment switches to a hash map keyed by [`Key`]. Point
//! operations become O(1); ordered scans pay a sort, which is acceptable
//! because dense segments are transient: the next rebalance re-emits them
//! as sparse files.

use rustc_hash::FxHashMap;

use super::key::Key;
use super::segment::Element;

/// A hash-map layout for churn-heavy segments.
#[derive(Default)]
pub struct DenseFile {
    map: FxHashMap<Key, Element>,
}

impl DenseFile {
    /// An empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dense file from existing elements.
    pub fn from_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        let mut map = FxHashMap::default();
        for element in elements {
            map.insert(element.key, element);
        }
        Self { map }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the file stores nothing.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Point lookup.
    pub fn find(&self, key: Key) -> Option<&Element> {
        self.map.get(&key)
    }

    /// Mutable point lookup.
    pub fn find_mut(&mut self, key: Key) -> Option<&mut Element> {
        self.map.get_mut(&key)
    }

    /// Inserts a new element. The key must not be present.
    pub fn insert(&mut self, element: Element) {
        let previous = self.map.insert(element.key, element);
        debug_assert!(previous.is_none(), "dense insert over an existing key");
    }

    /// References to all elements with `key >= from`, sorted ascending.
    pub fn sorted_from(&self, from: Key) -> Vec<&Element> {
        let mut elements: Vec<&Element> = self
            .map
            .values()
            .filter(|element| element.key >= from)
            .collect();
        elements.sort_unstable_by_key(|element| element.key);
        elements
    }

    /// Consumes the file into a sorted vector of elements.
    pub fn into_sorted(self) -> Vec<Element> {
        let mut elements: Vec<Element> = self.map.into_values().collect();
        elements.sort_unstable_by_key(|element| element.key);
        elements
    }
}

impl std::fmt::Debug for DenseFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseFile").field("len", &self.map.len()).finish()
    }
}
