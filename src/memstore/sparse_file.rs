//! The sparse-file layout of a segment.
//!
//! Entries live in two facing regions: the LHS stored in ascending key
//! order, the RHS stored in reverse, so both sides take cheap appends at
//! the shared gap in the middle. The logical content is the concatenation
//! of the LHS and the reversed RHS, strictly sorted by key with no
//! duplicates.

use super::key::Key;
use super::segment::Element;

/// A two-sided sorted run of elements.
#[derive(Default)]
pub struct SparseFile {
    /// Ascending.
    lhs: Vec<Element>,
    /// Descending; logically reversed and appended after `lhs`.
    rhs: Vec<Element>,
}

impl SparseFile {
    /// An empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a file from elements sorted ascending by key, splitting them
    /// evenly across the two regions.
    pub fn from_sorted(mut elements: Vec<Element>) -> Self {
        debug_assert!(elements.windows(2).all(|w| w[0].key < w[1].key));
        let half = elements.len() / 2;
        let mut rhs: Vec<Element> = elements.split_off(half);
        rhs.reverse();
        Self { lhs: elements, rhs }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.lhs.len() + self.rhs.len()
    }

    /// Whether the file stores nothing.
    pub fn is_empty(&self) -> bool {
        self.lhs.is_empty() && self.rhs.is_empty()
    }

    /// Element at the logical position `pos`.
    pub fn get(&self, pos: usize) -> &Element {
        if pos < self.lhs.len() {
            &self.lhs[pos]
        } else {
            let offset = pos - self.lhs.len();
            &self.rhs[self.rhs.len() - 1 - offset]
        }
    }

    /// Mutable element at the logical position `pos`.
    pub fn get_mut(&mut self, pos: usize) -> &mut Element {
        if pos < self.lhs.len() {
            &mut self.lhs[pos]
        } else {
            let offset = pos - self.lhs.len();
            let index = self.rhs.len() - 1 - offset;
            &mut self.rhs[index]
        }
    }

    /// Binary search across both regions. `Ok` holds the logical position
    /// of the key, `Err` the position where it would be inserted.
    pub fn search(&self, key: Key) -> Result<usize, usize> {
        match self.lhs.binary_search_by(|element| element.key.cmp(&key)) {
            Ok(position) => Ok(position),
            Err(position) if position < self.lhs.len() => Err(position),
            Err(_) => {
                // Beyond the LHS; search the descending RHS with the
                // comparison flipped so the probe sequence is ascending.
                match self.rhs.binary_search_by(|element| key.cmp(&element.key)) {
                    Ok(index) => Ok(self.lhs.len() + (self.rhs.len() - 1 - index)),
                    Err(index) => Err(self.lhs.len() + (self.rhs.len() - index)),
                }
            }
        }
    }

    /// Number of elements an insert at logical position `pos` would shift.
    pub fn shift_cost(&self, pos: usize) -> usize {
        if pos <= self.lhs.len() {
            self.lhs.len() - pos
        } else {
            pos - self.lhs.len()
        }
    }

    /// Inserts at the logical position `pos`, returning how many elements
    /// were shifted.
    pub fn insert_at(&mut self, pos: usize, element: Element) -> usize {
        debug_assert!(pos == 0 || self.get(pos - 1).key < element.key);
        debug_assert!(pos == self.len() || element.key < self.get(pos).key);
        if pos <= self.lhs.len() {
            let cost = self.lhs.len() - pos;
            self.lhs.insert(pos, element);
            cost
        } else {
            let offset = pos - self.lhs.len();
            let index = self.rhs.len() - offset;
            self.rhs.insert(index, element);
            offset
        }
    }

    /// Iterates elements in logical (ascending) order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.lhs.iter().chain(self.rhs.iter().rev())
    }

    /// Consumes the file into a sorted vector of elements.
    pub fn into_sorted(mut self) -> Vec<Element> {
        self.rhs.reverse();
        self.lhs.append(&mut self.rhs);
        self.lhs
    }

    /// Sizes of the two regions, for diagnostics.
    pub fn region_sizes(&self) -> (usize, usize) {
        (self.lhs.len(), self.rhs.len())
    }
}

impl std::fmt::Debug for SparseFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseFile")
            .field("lhs", &self.lhs.len())
            .field("rhs", &self.rhs.len())
            .finish()
    }
}
