// SPDX-License-Identifier: MPL-2.0

//! Memoization of tree nodes across IDPF evaluations.

use crate::idpf::node::SEED_SIZE;
use std::collections::{HashMap, VecDeque};

/// An interface that provides memoization of IDPF computations.
///
/// Each instance of a type implementing `IdpfCache` should only be used with one IDPF key and
/// public share.
///
/// A node is identified by its tree level and by its prefix, the `level + 1` most significant bits
/// of an input. The cached value is the node's seed and control bit after the node's level has
/// been processed. If one prefix is a prefix of another, the shorter prefix's path down the tree is
/// the start of the longer prefix's path, so evaluations of increasing length can resume from a
/// cached node instead of the root.
///
/// Control bits are stored as `0` or `1`. A cached value with any other control bit is ignored.
pub trait IdpfCache {
    /// Fetch cached values for the node identified by `level` and `prefix`.
    fn get(&self, level: usize, prefix: u128) -> Option<([u8; SEED_SIZE], u8)>;

    /// Store values corresponding to the node identified by `level` and `prefix`.
    fn insert(&mut self, level: usize, prefix: u128, values: &([u8; SEED_SIZE], u8));
}

/// A no-op [`IdpfCache`] implementation that always reports a cache miss.
#[derive(Debug, Default)]
pub struct NoCache {}

impl NoCache {
    /// Construct a `NoCache` object.
    pub fn new() -> NoCache {
        NoCache::default()
    }
}

impl IdpfCache for NoCache {
    fn get(&self, _: usize, _: u128) -> Option<([u8; SEED_SIZE], u8)> {
        None
    }

    fn insert(&mut self, _: usize, _: u128, _: &([u8; SEED_SIZE], u8)) {}
}

/// A simple [`IdpfCache`] implementation that caches intermediate results in an in-memory hash map,
/// with no eviction.
#[derive(Default)]
pub struct HashMapCache {
    map: HashMap<(usize, u128), ([u8; SEED_SIZE], u8)>,
}

impl HashMapCache {
    /// Create a new unpopulated `HashMapCache`.
    pub fn new() -> HashMapCache {
        HashMapCache::default()
    }

    /// Create a new unpopulated `HashMapCache`, with a set pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> HashMapCache {
        Self {
            map: HashMap::with_capacity(capacity),
        }
    }

    /// Number of cached nodes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no node is cached.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl IdpfCache for HashMapCache {
    fn get(&self, level: usize, prefix: u128) -> Option<([u8; SEED_SIZE], u8)> {
        self.map.get(&(level, prefix)).copied()
    }

    fn insert(&mut self, level: usize, prefix: u128, values: &([u8; SEED_SIZE], u8)) {
        self.map.entry((level, prefix)).or_insert(*values);
    }
}

/// A simple [`IdpfCache`] implementation that caches intermediate results in memory, with
/// least-recently-inserted eviction, and lookups via linear probing.
pub struct RingBufferCache {
    capacity: usize,
    ring: VecDeque<((usize, u128), [u8; SEED_SIZE], u8)>,
}

impl RingBufferCache {
    /// Create a new unpopulated `RingBufferCache` holding at most `capacity` nodes. A capacity of
    /// zero is treated as one.
    pub fn new(capacity: usize) -> RingBufferCache {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ring: VecDeque::with_capacity(capacity),
        }
    }
}

impl IdpfCache for RingBufferCache {
    fn get(&self, level: usize, prefix: u128) -> Option<([u8; SEED_SIZE], u8)> {
        // Most recent entries are at the back.
        self.ring
            .iter()
            .rev()
            .find(|entry| entry.0 == (level, prefix))
            .map(|entry| (entry.1, entry.2))
    }

    fn insert(&mut self, level: usize, prefix: u128, values: &([u8; SEED_SIZE], u8)) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(((level, prefix), values.0, values.1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cache_misses() {
        let mut cache = NoCache::new();
        cache.insert(0, 1, &([1; SEED_SIZE], 1));
        assert_eq!(cache.get(0, 1), None);
    }

    #[test]
    fn hash_map_cache_keeps_first_insert() {
        let mut cache = HashMapCache::with_capacity(4);
        assert!(cache.is_empty());
        cache.insert(2, 5, &([1; SEED_SIZE], 0));
        cache.insert(2, 5, &([2; SEED_SIZE], 1));
        assert_eq!(cache.get(2, 5), Some(([1; SEED_SIZE], 0)));
        // Same prefix value at another level is another node.
        assert_eq!(cache.get(1, 5), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ring_buffer_cache_evicts_oldest() {
        let mut cache = RingBufferCache::new(2);
        cache.insert(0, 0, &([0; SEED_SIZE], 0));
        cache.insert(0, 1, &([1; SEED_SIZE], 1));
        cache.insert(1, 2, &([2; SEED_SIZE], 0));
        assert_eq!(cache.get(0, 0), None);
        assert_eq!(cache.get(0, 1), Some(([1; SEED_SIZE], 1)));
        assert_eq!(cache.get(1, 2), Some(([2; SEED_SIZE], 0)));

        let mut tiny = RingBufferCache::new(0);
        tiny.insert(0, 0, &([0; SEED_SIZE], 0));
        tiny.insert(0, 1, &([1; SEED_SIZE], 0));
        assert_eq!(tiny.get(0, 0), None);
        assert_eq!(tiny.get(0, 1), Some(([1; SEED_SIZE], 0)));
    }
}
