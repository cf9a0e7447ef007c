//! Per-set replacement strategies.
//!
//! Only `access` changes state. `get_next_to_replace` is a pure query so
//! that displays may ask for the next victim as often as they like.

use serde::{Deserialize, Serialize};

/// Replacement policy selector used in configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacementPolicy {
    #[default]
    Lru,
    Plru,
}

/// Replacement state of a single cache set
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplacementStrategy {
    Lru(Lru),
    Plru(Plru),
}

impl ReplacementStrategy {
    pub fn new(policy: ReplacementPolicy, associativity: usize) -> Self {
        match policy {
            ReplacementPolicy::Lru => Self::Lru(Lru::new(associativity)),
            ReplacementPolicy::Plru => Self::Plru(Plru::new(associativity)),
        }
    }

    /// Records that block `index` was just touched
    pub fn access(&mut self, index: usize) {
        match self {
            Self::Lru(lru) => lru.access(index),
            Self::Plru(plru) => plru.access(index),
        }
    }

    /// Block index to evict next
    pub fn get_next_to_replace(&self) -> usize {
        match self {
            Self::Lru(lru) => lru.get_next_to_replace(),
            Self::Plru(plru) => plru.get_next_to_replace(),
        }
    }
}

/// True LRU: block indices ordered from least to most recently used
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lru {
    order: Vec<usize>,
}

impl Lru {
    pub fn new(associativity: usize) -> Self {
        Self { order: (0..associativity).collect() }
    }

    pub fn access(&mut self, index: usize) {
        if let Some(position) = self.order.iter().position(|&i| i == index) {
            self.order.remove(position);
        }
        self.order.push(index);
    }

    pub fn get_next_to_replace(&self) -> usize {
        self.order.first().copied().unwrap_or(0)
    }

    /// Current order, least recently used first
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

/// Tree pseudo-LRU.
///
/// `associativity - 1` decision bits stored as an implicit binary tree:
/// node `n` has children `2n + 1` and `2n + 2`, and block `b` is the leaf
/// `associativity - 1 + b`. A bit of `false` prefers the left subtree,
/// `true` the right one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plru {
    tree: Vec<bool>,
    associativity: usize,
}

impl Plru {
    pub fn new(associativity: usize) -> Self {
        Self {
            tree: vec![false; associativity.saturating_sub(1)],
            associativity,
        }
    }

    /// Points every node on the path to `index` away from it
    pub fn access(&mut self, index: usize) {
        if index >= self.associativity {
            return;
        }
        let mut node = self.tree.len() + index;
        while node > 0 {
            let parent = (node - 1) / 2;
            let came_from_left = node == 2 * parent + 1;
            self.tree[parent] = came_from_left;
            node = parent;
        }
    }

    pub fn get_next_to_replace(&self) -> usize {
        let internal = self.tree.len();
        let mut node = 0;
        while node < internal {
            node = if self.tree[node] { 2 * node + 2 } else { 2 * node + 1 };
        }
        node - internal
    }

    pub fn bits(&self) -> &[bool] {
        &self.tree
    }
}
