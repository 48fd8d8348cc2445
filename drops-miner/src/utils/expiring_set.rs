//! A set whose entries expire individually.
//!
//! Expiry is lazy: membership checks drop stale entries, so no sweep task
//! is needed. Insertion opportunistically prunes the whole set once it grows
//! past [`PRUNE_MIN_SIZE`].

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Minimum size before an insertion triggers a full pruning pass.
const PRUNE_MIN_SIZE: usize = 64;

/// A set of keys, each with its own time-to-live.
#[derive(Debug, Clone)]
pub struct ExpiringSet<K> {
    entries: HashMap<K, Instant>,
}

impl<K: Eq + Hash> ExpiringSet<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert `key` so that it expires `ttl` from now.
    ///
    /// Re-inserting a present key restarts its lifetime.
    pub fn insert(&mut self, key: K, ttl: Duration) {
        let now = Instant::now();
        if self.entries.len() >= PRUNE_MIN_SIZE {
            self.entries.retain(|_, expires_at| *expires_at > now);
        }
        self.entries.insert(key, now + ttl);
    }

    /// Check membership, removing the entry if it has expired.
    pub fn contains<Q>(&mut self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let live = match self.entries.get(key) {
            Some(expires_at) => *expires_at > Instant::now(),
            None => return false,
        };
        if !live {
            self.entries.remove(key);
        }
        live
    }

    /// Time left before `key` expires, if it is present and live.
    pub fn remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|expires_at| **expires_at > now)
            .map(|expires_at| *expires_at - now)
    }

    /// Number of entries, including ones that expired but were not checked since.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash> Default for ExpiringSet<K> {
    fn default() -> Self {
        Self::new()
    }
}
