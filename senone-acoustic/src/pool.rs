//! Indexed parameter storage
//!
//! A `Pool` is the sole owner of one kind of model parameter (means,
//! variances, mixture weights, transition matrices). Everything else refers
//! to entries by index, so an in-place update is visible to every state that
//! ties to the entry.

use std::collections::HashMap;
use std::fmt;

/// Named integer metadata attached to a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    NumSenones,
    NumGaussiansPerState,
    NumStreams,
    VectorLength,
}

pub struct Pool<T> {
    name: String,
    entries: Vec<T>,
    features: HashMap<Feature, i64>,
}

impl<T> Pool<T> {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            features: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry at `index`; panics when out of range
    pub fn get(&self, index: usize) -> &T {
        &self.entries[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut T {
        &mut self.entries[index]
    }

    /// Replace the entry at `index`, or append when `index == size()`
    pub fn put(&mut self, index: usize, value: T) {
        assert!(
            index <= self.entries.len(),
            "pool {}: put at {} beyond size {}",
            self.name,
            index,
            self.entries.len()
        );
        if index == self.entries.len() {
            self.entries.push(value);
        } else {
            self.entries[index] = value;
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the entry stored at `value`'s address
    ///
    /// Lookup is by identity, not equality: two equal vectors in different
    /// slots are distinct entries.
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.entries.iter().position(|entry| std::ptr::eq(entry, value))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn feature(&self, feature: Feature, default: i64) -> i64 {
        self.features.get(&feature).copied().unwrap_or(default)
    }

    pub fn set_feature(&mut self, feature: Feature, value: i64) {
        self.features.insert(feature, value);
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("size", &self.entries.len())
            .field("features", &self.features)
            .finish()
    }
}
